// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut

//! Filter condition and routing graph tests

use super::super::*;

/// Raw mode 2 sector with the given header address and subheader
fn sector_with(fad: u32, file: u8, channel: u8, sub_mode: u8, coding_info: u8) -> [u8; RAW_SECTOR_SIZE] {
    let mut data = [0u8; RAW_SECTOR_SIZE];
    data[12] = dec_to_bcd((fad / (60 * 75)) as u8);
    data[13] = dec_to_bcd(((fad / 75) % 60) as u8);
    data[14] = dec_to_bcd((fad % 75) as u8);
    data[15] = 0x02;
    data[16] = file;
    data[17] = channel;
    data[18] = sub_mode;
    data[19] = coding_info;
    data
}

#[test]
fn test_fad_range_is_half_open() {
    let mut f = Filter::default();
    f.mode = Filter::COND_FAD_RANGE;
    f.fad = 1000;
    f.range = 10;

    assert!(!f.test_sector(&sector_with(999, 0, 0, 0, 0)));
    assert!(f.test_sector(&sector_with(1000, 0, 0, 0, 0)));
    assert!(f.test_sector(&sector_with(1009, 0, 0, 0, 0)));
    assert!(!f.test_sector(&sector_with(1010, 0, 0, 0, 0)));
}

#[test]
fn test_subheader_conditions() {
    let mut f = Filter::default();
    f.mode = Filter::COND_FILE | Filter::COND_CHANNEL;
    f.file = 3;
    f.channel = 7;

    assert!(f.test_sector(&sector_with(0, 3, 7, 0, 0)));
    assert!(!f.test_sector(&sector_with(0, 3, 8, 0, 0)));
    assert!(!f.test_sector(&sector_with(0, 4, 7, 0, 0)));

    f.mode = Filter::COND_SUB_MODE;
    f.sub_mode = 0x20;
    f.sub_mode_mask = 0x20;
    assert!(f.test_sector(&sector_with(0, 0, 0, 0x64, 0)));
    assert!(!f.test_sector(&sector_with(0, 0, 0, 0x44, 0)));

    f.mode = Filter::COND_CODING_INFO;
    f.coding_info = 0x01;
    f.coding_info_mask = 0x0F;
    assert!(f.test_sector(&sector_with(0, 0, 0, 0, 0xF1)));
    assert!(!f.test_sector(&sector_with(0, 0, 0, 0, 0xF2)));
}

#[test]
fn test_invert_applies_to_subheader_outcome_only() {
    let mut f = Filter::default();
    f.mode = Filter::COND_FAD_RANGE | Filter::COND_FILE | Filter::COND_INVERT;
    f.fad = 1000;
    f.range = 100;
    f.file = 3;

    // Wrong file inside the range: inverted to a pass
    assert!(f.test_sector(&sector_with(1050, 4, 0, 0, 0)));
    // Right file inside the range: inverted to a fail
    assert!(!f.test_sector(&sector_with(1050, 3, 0, 0, 0)));
    // Outside the range the sector fails no matter what
    assert!(!f.test_sector(&sector_with(2000, 4, 0, 0, 0)));
}

#[test]
fn test_invert_without_subheader_condition_is_inert() {
    let mut f = Filter::default();
    f.mode = Filter::COND_INVERT;

    assert!(f.test_sector(&sector_with(0, 0, 0, 0, 0)));
    assert!(f.test_sector(&sector_with(5000, 9, 9, 9, 9)));
}

#[test]
fn test_sector_without_subheader_tests_as_zeros() {
    let mut f = Filter::default();
    f.mode = Filter::COND_FILE;
    f.file = 0;

    let mut mode1 = sector_with(300, 5, 5, 5, 5);
    mode1[15] = 0x01;

    // A mode 1 sector has no subheader, so the stale bytes are ignored
    assert!(f.test_sector(&mode1));
    f.file = 5;
    assert!(!f.test_sector(&mode1));
}

#[test]
fn test_route_lands_in_true_partition() {
    let filters = FilterSet::new();
    let mut pool = BufferPool::new();

    let index = pool.allocate(false);
    *pool.data_mut(index) = sector_with(1000, 0, 0, 0, 0);

    let dest = filters.route(&mut pool, 4, index);

    assert_eq!(dest, 4);
    assert_eq!(pool.partition(4).count, 1);
    assert_eq!(pool.free_count(), NUM_BUFFERS as u8 - 1);
}

#[test]
fn test_route_chains_through_false_connection() {
    let mut filters = FilterSet::new();
    let mut pool = BufferPool::new();

    filters.filter_mut(0).mode = Filter::COND_FILE;
    filters.filter_mut(0).file = 5;
    filters.connect_false(0, 1);

    let index = pool.allocate(false);
    *pool.data_mut(index) = sector_with(1000, 0, 0, 0, 0);

    let dest = filters.route(&mut pool, 0, index);

    assert_eq!(dest, 1);
    assert_eq!(pool.partition(0).count, 0);
    assert_eq!(pool.partition(1).count, 1);
}

#[test]
fn test_route_discards_when_nothing_accepts() {
    let mut filters = FilterSet::new();
    let mut pool = BufferPool::new();

    filters.filter_mut(0).mode = Filter::COND_FILE;
    filters.filter_mut(0).file = 5;

    let index = pool.allocate(false);
    *pool.data_mut(index) = sector_with(1000, 0, 0, 0, 0);

    assert_eq!(filters.route(&mut pool, 0, index), NO_FILTER);
    assert_eq!(pool.free_count(), NUM_BUFFERS as u8);
}

#[test]
fn test_route_discards_through_open_true_connection() {
    let mut filters = FilterSet::new();
    let mut pool = BufferPool::new();

    filters.filter_mut(2).true_conn = NO_FILTER;

    let index = pool.allocate(false);
    *pool.data_mut(index) = sector_with(1000, 0, 0, 0, 0);

    assert_eq!(filters.route(&mut pool, 2, index), NO_FILTER);
    assert_eq!(pool.partition(2).count, 0);
    assert_eq!(pool.free_count(), NUM_BUFFERS as u8);
}

#[test]
fn test_route_survives_connection_cycle() {
    let mut filters = FilterSet::new();
    let mut pool = BufferPool::new();

    // Two rejecting filters pointing at each other
    for fnum in [0, 1] {
        filters.filter_mut(fnum).mode = Filter::COND_FILE;
        filters.filter_mut(fnum).file = 5;
    }
    filters.filter_mut(0).false_conn = 1;
    filters.filter_mut(1).false_conn = 0;

    let index = pool.allocate(false);
    *pool.data_mut(index) = sector_with(1000, 0, 0, 0, 0);

    assert_eq!(filters.route(&mut pool, 0, index), NO_FILTER);
    assert_eq!(pool.free_count(), NUM_BUFFERS as u8);
    assert!(pool.links_valid());
}

#[test]
fn test_filter_input_is_exclusive() {
    let mut filters = FilterSet::new();

    filters.set_device_conn(3);
    assert_eq!(filters.device_conn(), 3);

    // Wiring a false output to filter 3 steals it from the drive
    filters.connect_false(2, 3);
    assert_eq!(filters.device_conn(), NO_FILTER);
    assert_eq!(filters.filter(2).false_conn, 3);

    // And handing it back to the drive clears the false output
    filters.set_device_conn(3);
    assert_eq!(filters.filter(2).false_conn, NO_FILTER);
    assert_eq!(filters.device_conn(), 3);
}

#[test]
fn test_reset_restores_identity_routing() {
    let mut filters = FilterSet::new();

    filters.set_device_conn(0);
    filters.filter_mut(5).mode = Filter::COND_CHANNEL;
    filters.filter_mut(5).true_conn = 9;
    filters.connect_false(5, 6);

    filters.reset();

    assert_eq!(filters.device_conn(), NO_FILTER);
    assert_eq!(filters.last_dest(), NO_FILTER);
    for fnum in 0..NUM_FILTERS as u8 {
        assert_eq!(filters.filter(fnum).mode, 0);
        assert_eq!(filters.filter(fnum).true_conn, fnum);
        assert_eq!(filters.filter(fnum).false_conn, NO_FILTER);
    }
}
