//! Quick benchmark of segment throughput through one destination

use conveyor::{Conveyor, ConveyorOptions, Source};
use std::time::Instant;

fn main() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    println!("Conveyor Throughput Test");
    println!("========================\n");

    // (segments, bytes per segment)
    let cases = [(10, 64 * 1024), (1_000, 1024), (10_000, 16)];

    for (segments, size) in cases {
        let chunk = vec![b'x'; size];

        let start = Instant::now();
        let out = runtime.block_on(async {
            let conveyor = Conveyor::new(
                Vec::<u8>::with_capacity(segments * size),
                ConveyorOptions::default(),
            );
            for _ in 0..segments {
                conveyor.push(Source::from_bytes(chunk.clone())).unwrap();
            }
            conveyor.finish().await.unwrap()
        });
        let elapsed = start.elapsed();

        assert_eq!(out.len(), segments * size);
        let per_segment = elapsed / segments as u32;
        let mib_per_sec = out.len() as f64 / (1024.0 * 1024.0) / elapsed.as_secs_f64();
        println!(
            "{:>6} segments x {:>6} B: {:>10.2?} total, {:>8.2?}/segment, {:>8.1} MiB/s",
            segments, size, elapsed, per_segment, mib_per_sec
        );
    }
}
