//! Built-in self-test (`--test`)
//!
//! Parses a few sample lines, packs each payload and unpacks it again. Never
//! touches a store or an input file.

use anyhow::{ensure, Context};
use tracing::info;

use crate::payload::UserApps;
use crate::record::parse_appsinstalled;

pub const SAMPLE_LINES: [&str; 2] = [
    "idfa\t1rfw452y52g2gq4g\t55.55\t42.42\t1423,43,567,3,7,23",
    "gaid\t7rfw452y52g2gq4g\t55.55\t42.42\t7423,424",
];

/// Round-trip every sample line through the wire payload
pub fn run_self_test() -> anyhow::Result<()> {
    for line in SAMPLE_LINES {
        let record = parse_appsinstalled(line)
            .with_context(|| format!("Sample line rejected: {:?}", line))?;
        let payload = UserApps::from(&record);

        let packed = payload.pack();
        let unpacked = UserApps::unpack(&packed).context("Failed to unpack sample payload")?;
        ensure!(
            unpacked == payload,
            "Payload changed in round trip for {}: {:?} != {:?}",
            record.key(),
            unpacked,
            payload
        );

        info!(key = %record.key(), bytes = packed.len(), "Self-test record ok");
    }
    Ok(())
}
