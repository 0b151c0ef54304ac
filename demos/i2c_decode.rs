//! Decode a synthesized I2C transaction, directly and through the
//! streaming engine.
//!
//! Run with:
//!
//! ```sh
//! cargo run --example i2c_decode -- --transactions 200 --chunk-size 500
//! ```

use clap::Parser;
use tracedec::decoders::I2cDecoder;
use tracedec::orchestrator::ChunkedDecoderRunner;
use tracedec::{
    ChannelData, Decoder, DecoderRegistry, Orchestrator, StreamingConfig,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(about = "I2C decode demo: direct and streaming execution")]
struct Args {
    /// Number of write transactions to synthesize
    #[arg(long, default_value_t = 50)]
    transactions: usize,

    /// Streaming chunk size in samples
    #[arg(long, default_value_t = 500)]
    chunk_size: usize,

    /// Print every decoded annotation instead of a summary
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

/// Synthesize `count` I2C write transactions to address 0x50
fn synthesize(count: usize) -> Vec<ChannelData> {
    let mut scl = vec![1u8];
    let mut sda = vec![1u8];
    let push = |s: u8, d: u8, scl: &mut Vec<u8>, sda: &mut Vec<u8>| {
        scl.push(s);
        sda.push(d);
    };
    let clock_byte = |value: u8, scl: &mut Vec<u8>, sda: &mut Vec<u8>| {
        for i in (0..8).rev() {
            let bit = (value >> i) & 1;
            push(0, bit, scl, sda);
            push(1, bit, scl, sda);
        }
        // ACK from the slave
        push(0, 0, scl, sda);
        push(1, 0, scl, sda);
    };

    for n in 0..count {
        // Start: SDA falls while SCL is high
        push(1, 1, &mut scl, &mut sda);
        push(1, 0, &mut scl, &mut sda);
        clock_byte(0xA0, &mut scl, &mut sda);
        clock_byte((n % 256) as u8, &mut scl, &mut sda);
        // Stop: SDA rises while SCL is high
        push(0, 0, &mut scl, &mut sda);
        push(1, 0, &mut scl, &mut sda);
        push(1, 1, &mut scl, &mut sda);
    }

    vec![
        ChannelData::new(0, "SCL", scl),
        ChannelData::new(1, "SDA", sda),
    ]
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let channels = synthesize(args.transactions);
    let total_samples = channels[0].len();
    info!(
        "synthesized {} transaction(s), {} samples",
        args.transactions, total_samples
    );

    let registry = DecoderRegistry::new();
    registry.register("i2c", || Box::new(I2cDecoder::new()));
    registry.register_streaming("i2c", || {
        Box::new(ChunkedDecoderRunner::new(|| {
            Box::new(I2cDecoder::new()) as Box<dyn Decoder>
        }))
    });
    let orchestrator = Orchestrator::new(registry);

    // Direct execution
    let report = orchestrator.execute_decoder("i2c", 1_000_000, &channels, &[])?;
    info!(
        "direct run: success={} spans={} in {} ms",
        report.success,
        report.results.len(),
        report.execution_time_ms
    );
    if args.verbose {
        for span in &report.results {
            println!(
                "[{:>6}..{:>6}] {}",
                span.start_sample,
                span.end_sample,
                span.values.first().map(String::as_str).unwrap_or("")
            );
        }
    }

    // Streaming execution with progress reporting
    let config = StreamingConfig {
        chunk_size: args.chunk_size,
        ..Default::default()
    };
    let on_progress = |p: tracedec::ProgressSnapshot| {
        info!(
            "progress: {:.1}% (chunk {}/{}, {:.0} samples/s)",
            p.percent, p.current_chunk, p.total_chunks, p.speed
        );
    };
    let streaming = orchestrator.execute_streaming_decoder(
        "i2c",
        1_000_000,
        &channels,
        &[],
        config,
        Some(&on_progress),
        None,
    )?;
    info!(
        "streaming run: success={} spans={} chunks={} peak_mem={} B",
        streaming.outcome.success,
        streaming.outcome.results.len(),
        streaming.outcome.stats.chunks_processed,
        streaming.outcome.stats.peak_memory_usage
    );

    orchestrator.dispose();
    Ok(())
}
