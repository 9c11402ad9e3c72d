//! Integration tests for the memory timing models and data caches.

use patmos_sim::core::units::cache::{DataCache, IdealDataCache, LruDataCache, NoDataCache};
use patmos_sim::mem::{DelayedMemory, FixedTiming, IdealMemory, Memory, TdmTiming};

fn delayed(posted: usize) -> DelayedMemory {
    DelayedMemory::new(
        IdealMemory::new(4096, false),
        Box::new(FixedTiming::new(8, 2, 2)),
        8,
        posted,
    )
}

/// Polls a read until the memory completes it.
fn read_poll(mem: &mut dyn Memory, address: u32, data: &mut [u8]) -> u64 {
    let mut cycles = 0;
    while !mem.read(address, data).unwrap() {
        mem.tick();
        cycles += 1;
        assert!(cycles < 10_000, "read never completed");
    }
    cycles
}

/// Polls a write until the memory accepts it.
fn write_poll(mem: &mut dyn Memory, address: u32, data: &[u8]) -> u64 {
    let mut cycles = 0;
    while !mem.write(address, data).unwrap() {
        mem.tick();
        cycles += 1;
        assert!(cycles < 10_000, "write never completed");
    }
    cycles
}

/// Write-then-read round trips on every access width.
#[test]
fn test_round_trip_all_widths() {
    for width in [1usize, 2, 4] {
        let mut mem = delayed(0);
        let pattern: Vec<u8> = (0..width as u8).map(|i| 0x80 | i).collect();

        write_poll(&mut mem, 64, &pattern);
        let mut buf = vec![0u8; width];
        read_poll(&mut mem, 64, &mut buf);
        assert_eq!(buf, pattern, "width {} round trip", width);
    }
}

/// Round trips survive an intervening unrelated write.
#[test]
fn test_round_trip_with_unrelated_write() {
    let mut mem = delayed(0);
    write_poll(&mut mem, 0x100, &[1, 2, 3, 4]);
    write_poll(&mut mem, 0x200, &[9, 9, 9, 9]);

    let mut buf = [0u8; 4];
    read_poll(&mut mem, 0x100, &mut buf);
    assert_eq!(buf, [1, 2, 3, 4]);
}

/// The request queue drains to empty once requests stop arriving.
#[test]
fn test_queue_drains_after_latency() {
    let mut mem = delayed(4);
    assert!(mem.write(0, &[1, 2, 3, 4]).unwrap(), "posted write completes");
    assert!(mem.write(64, &[5, 6, 7, 8]).unwrap());
    assert!(!mem.is_ready());

    for _ in 0..32 {
        mem.tick();
    }
    assert!(mem.is_ready(), "queue must drain with no new requests");
}

/// Reads see data of still-queued posted writes.
#[test]
fn test_posted_write_visible_to_read() {
    let mut mem = delayed(4);
    assert!(mem.write(32, &[0xDE, 0xAD, 0xBE, 0xEF]).unwrap());

    let mut buf = [0u8; 4];
    read_poll(&mut mem, 32, &mut buf);
    assert_eq!(buf, [0xDE, 0xAD, 0xBE, 0xEF]);
}

/// Posted-write capacity throttles the issuer.
#[test]
fn test_posted_write_capacity_throttles() {
    let mut mem = delayed(1);
    assert!(mem.write(0, &[1, 1, 1, 1]).unwrap());
    // Second write exceeds the bound; the caller has to retry.
    let accepted = mem.write(64, &[2, 2, 2, 2]).unwrap();
    assert!(!accepted, "second posted write must wait");
}

/// Larger requests take proportionally longer.
#[test]
fn test_latency_scales_with_bursts() {
    let mut mem = delayed(0);
    let mut small = [0u8; 4];
    let mut large = [0u8; 32];
    let t_small = read_poll(&mut mem, 0, &mut small);
    let t_large = read_poll(&mut mem, 64, &mut large);
    assert!(
        t_large > t_small,
        "32 bytes ({} cycles) must outlast 4 bytes ({} cycles)",
        t_large,
        t_small
    );
}

/// Each extra TDM burst costs a whole extra round.
#[test]
fn test_tdm_bursts_pay_full_rounds() {
    let tdm_read = |bytes: usize| -> u64 {
        let mut mem = DelayedMemory::new(
            IdealMemory::new(256, false),
            // 4 cores of 4 ticks each: a 16-tick round.
            Box::new(TdmTiming::new(8, 4, 1, 4, 0, 0)),
            8,
            0,
        );
        let mut buf = vec![0u8; bytes];
        read_poll(&mut mem, 0, &mut buf)
    };

    let one_burst = tdm_read(4);
    let two_bursts = tdm_read(16);
    assert_eq!(
        two_bursts,
        one_burst + 16,
        "the second burst waits for the next round"
    );
}

/// Data cache variants all round trip against the backing memory.
#[test]
fn test_data_cache_round_trip() {
    let caches: Vec<Box<dyn DataCache>> = vec![
        Box::new(IdealDataCache),
        Box::new(NoDataCache),
        Box::new(LruDataCache::new(256, 32, 2)),
    ];

    for mut cache in caches {
        let mut mem = delayed(0);
        let mut cycles = 0;
        while !cache.write(&mut mem, 0x80, &[4, 3, 2, 1]).unwrap() {
            mem.tick();
            cycles += 1;
            assert!(cycles < 10_000);
        }
        let mut buf = [0u8; 4];
        while !cache.read(&mut mem, 0x80, &mut buf).unwrap() {
            mem.tick();
            cycles += 1;
            assert!(cycles < 10_000);
        }
        assert_eq!(buf, [4, 3, 2, 1]);
    }
}

/// A cache hit is served without touching the memory timing.
#[test]
fn test_lru_data_cache_hit_is_free() {
    let mut mem = delayed(0);
    let mut cache = LruDataCache::new(256, 32, 2);

    let mut buf = [0u8; 4];
    let mut miss_cycles = 0;
    while !cache.read(&mut mem, 0x40, &mut buf).unwrap() {
        mem.tick();
        miss_cycles += 1;
    }
    assert!(miss_cycles > 0, "first access pays the memory latency");

    assert!(
        cache.read(&mut mem, 0x44, &mut buf).unwrap(),
        "hit in the same line completes immediately"
    );
    assert_eq!(cache.hits, 1);
}
