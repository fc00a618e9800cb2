//! Benchmark utilities.

use listwatch_engine::ScriptedStream;
use listwatch_protocol::{ResourceVersion, Vpc, WatchResponse};
use rand::Rng;

/// Generate a VPC with a random CIDR block and a few labels.
pub fn random_vpc(account: usize, index: usize) -> Vpc {
    let mut rng = rand::thread_rng();
    Vpc::new(format!("{:012}", account + 1), format!("vpc-{index}"))
        .with_cidr_block(format!("10.{}.0.0/16", rng.gen::<u8>()))
        .with_region("us-west-2")
        .with_label("team", format!("team-{}", rng.gen_range(0..16)))
        .with_label("env", "bench")
        .with_resource_version(ResourceVersion::from_sequence(index as u64 + 1))
}

/// Generate `count` VPCs spread over `accounts` accounts.
pub fn generate_vpcs(count: usize, accounts: usize) -> Vec<Vpc> {
    let accounts = accounts.max(1);
    (0..count)
        .map(|i| random_vpc(i % accounts, i / accounts))
        .collect()
}

/// Generate the wire deltas of a List over `vpcs`, bookmark included.
pub fn list_responses(vpcs: &[Vpc]) -> Vec<WatchResponse<Vpc>> {
    let mut responses: Vec<_> = vpcs.iter().cloned().map(WatchResponse::added).collect();
    responses.push(WatchResponse::bookmark(ResourceVersion::from_sequence(
        vpcs.len() as u64,
    )));
    responses
}

/// Build a scripted List stream over `vpcs`.
pub fn list_stream(vpcs: &[Vpc]) -> ScriptedStream<Vpc> {
    list_responses(vpcs)
        .into_iter()
        .fold(ScriptedStream::new(), ScriptedStream::send)
}
