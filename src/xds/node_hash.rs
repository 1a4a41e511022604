//! Derives the snapshot-cache key for a connecting data-plane node.

use envoy_types::pb::envoy::config::core::v3::Node;
use envoy_types::pb::google::protobuf::value::Kind;

/// Node key used when a connecting proxy carries no (or an empty) role.
///
/// The Go original's `ProxyKeyHasherV3.ID()` returns `""` here with a
/// `// TODO: use FallbackNodeKey` left in place; this hasher closes that gap
/// and actually returns the fallback key, matching the fallback snapshot
/// preloaded into the cache at startup.
pub const FALLBACK_NODE_KEY: &str = "misconfigured-node";

/// Extracts a cache key from an xDS `Node`, grounded in `xds.go`'s
/// `ProxyKeyHasherV3`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeHasher;

impl NodeHasher {
    /// `node.metadata.fields["role"]` if present and non-empty, else
    /// [`FALLBACK_NODE_KEY`].
    pub fn id(&self, node: Option<&Node>) -> String {
        let role = node
            .and_then(|n| n.metadata.as_ref())
            .and_then(|meta| meta.fields.get("role"))
            .and_then(|value| value.kind.as_ref())
            .and_then(|kind| match kind {
                Kind::StringValue(s) => Some(s.as_str()),
                _ => None,
            })
            .unwrap_or("");

        if role.is_empty() {
            FALLBACK_NODE_KEY.to_string()
        } else {
            role.to_string()
        }
    }
}
