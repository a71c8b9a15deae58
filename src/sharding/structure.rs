//! Per-shard endpoint layout advertised to clients.

use serde::Serialize;

/// Placeholder replaced by the shard id in endpoint templates.
pub const SHARD_PLACEHOLDER: &str = "%d";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShardEndpoint {
    pub current: bool,
    #[serde(rename = "shardID")]
    pub shard_id: u32,
    pub http: String,
    pub ws: String,
}

/// One record per shard, ascending by shard id, with the shard id substituted
/// into both endpoint templates.
pub fn gen_sharding_structure(
    num_shards: u32,
    current_shard_id: u32,
    http_template: &str,
    ws_template: &str,
) -> Vec<ShardEndpoint> {
    (0..num_shards)
        .map(|shard_id| ShardEndpoint {
            current: shard_id == current_shard_id,
            shard_id,
            http: fill_template(http_template, shard_id),
            ws: fill_template(ws_template, shard_id),
        })
        .collect()
}

fn fill_template(template: &str, shard_id: u32) -> String {
    template.replace(SHARD_PLACEHOLDER, &shard_id.to_string())
}
