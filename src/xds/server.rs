//! Streaming xDS gRPC server: binds CDS/EDS/LDS/RDS onto one generic
//! state-of-the-world discovery core, keyed by [`NodeHasher`] and backed by
//! [`SnapshotCache`]. Grounded in `xds/services/stream.rs`'s `run_stream_loop`
//! and generalizes the teacher's per-service
//! `MinimalAggregatedDiscoveryService`/`DatabaseAggregatedDiscoveryService`
//! duplication into one generic core plus four thin trait wrappers.

use super::cache::SnapshotCache;
use super::node_hash::NodeHasher;
use async_stream::try_stream;
use envoy_types::pb::envoy::config::cluster::v3::Cluster;
use envoy_types::pb::envoy::config::endpoint::v3::ClusterLoadAssignment;
use envoy_types::pb::envoy::config::listener::v3::Listener;
use envoy_types::pb::envoy::config::route::v3::RouteConfiguration;
use envoy_types::pb::envoy::service::cluster::v3::cluster_discovery_service_server::ClusterDiscoveryService;
use envoy_types::pb::envoy::service::discovery::v3::{DiscoveryRequest, DiscoveryResponse};
use envoy_types::pb::envoy::service::endpoint::v3::endpoint_discovery_service_server::EndpointDiscoveryService;
use envoy_types::pb::envoy::service::listener::v3::listener_discovery_service_server::ListenerDiscoveryService;
use envoy_types::pb::envoy::service::route::v3::route_discovery_service_server::RouteDiscoveryService;
use futures::Stream;
use prost::Message;
use prost_types::Any;
use std::pin::Pin;
use std::sync::Arc;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, info, instrument};

pub const CLUSTER_TYPE_URL: &str = "type.googleapis.com/envoy.config.cluster.v3.Cluster";
pub const ENDPOINT_TYPE_URL: &str = "type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment";
pub const LISTENER_TYPE_URL: &str = "type.googleapis.com/envoy.config.listener.v3.Listener";
pub const ROUTE_TYPE_URL: &str = "type.googleapis.com/envoy.config.route.v3.RouteConfiguration";

type DiscoveryStream = Pin<Box<dyn Stream<Item = Result<DiscoveryResponse, Status>> + Send>>;

/// One core shared by all four discovery services: derives a node key from
/// the first request on a stream, subscribes to that node's snapshot, and
/// re-encodes the relevant slice of the snapshot on every change.
pub struct DiscoveryCore {
    cache: Arc<SnapshotCache>,
    hasher: NodeHasher,
}

impl DiscoveryCore {
    pub fn new(cache: Arc<SnapshotCache>) -> Self {
        Self { cache, hasher: NodeHasher }
    }

    fn encode(&self, type_url: &str, snapshot: &crate::domain::XdsSnapshot) -> Vec<Any> {
        match type_url {
            CLUSTER_TYPE_URL => snapshot
                .clusters
                .values()
                .map(|c: &Cluster| Any { type_url: type_url.to_string(), value: c.encode_to_vec() })
                .collect(),
            ENDPOINT_TYPE_URL => snapshot
                .endpoints
                .values()
                .map(|e: &ClusterLoadAssignment| Any {
                    type_url: type_url.to_string(),
                    value: e.encode_to_vec(),
                })
                .collect(),
            LISTENER_TYPE_URL => snapshot
                .listeners
                .values()
                .map(|l: &Listener| Any { type_url: type_url.to_string(), value: l.encode_to_vec() })
                .collect(),
            ROUTE_TYPE_URL => snapshot
                .routes
                .values()
                .map(|r: &RouteConfiguration| Any {
                    type_url: type_url.to_string(),
                    value: r.encode_to_vec(),
                })
                .collect(),
            other => {
                debug!(type_url = other, "unrecognized discovery type url");
                Vec::new()
            }
        }
    }

    /// Drive one state-of-the-world stream for `type_url`. The first request
    /// on the stream carries the node identity; every response after that is
    /// keyed off the same node, regardless of what later requests carry.
    #[instrument(skip(self, requests), fields(type_url))]
    fn stream(
        self: Arc<Self>,
        type_url: &'static str,
        mut requests: Streaming<DiscoveryRequest>,
    ) -> DiscoveryStream {
        let core = self;
        Box::pin(try_stream! {
            let mut node_key: Option<String> = None;
            let mut last_sent_version: Option<u64> = None;

            loop {
                if node_key.is_none() {
                    match requests.message().await.map_err(|e| Status::internal(e.to_string()))? {
                        Some(req) => {
                            let key = core.hasher.id(req.node.as_ref());
                            info!(node_key = %key, type_url, "discovery stream established");
                            node_key = Some(key);
                        }
                        None => break,
                    }
                }

                let key = node_key.clone().expect("node_key set above");
                let mut watch = core.cache.watch(&key);
                let version = core.cache.version(&key);

                if last_sent_version != Some(version) {
                    let snapshot = watch.borrow_and_update().clone();
                    yield DiscoveryResponse {
                        version_info: version.to_string(),
                        resources: core.encode(type_url, &snapshot),
                        canary: false,
                        type_url: type_url.to_string(),
                        nonce: version.to_string(),
                        control_plane: None,
                        resource_errors: Vec::new(),
                    };
                    last_sent_version = Some(version);
                }

                tokio::select! {
                    changed = watch.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    next = requests.message() => {
                        match next.map_err(|e| Status::internal(e.to_string()))? {
                            // A NACK (error_detail set) re-sends the last snapshot
                            // on the same nonce; an ACK of the current nonce is a
                            // no-op and we just keep waiting on `watch.changed()`.
                            Some(ack) if ack.error_detail.is_some() => {
                                last_sent_version = None;
                                continue;
                            }
                            Some(_ack) => continue,
                            None => break,
                        }
                    }
                }
            }
        })
    }

    async fn fetch(
        &self,
        type_url: &'static str,
        request: Request<DiscoveryRequest>,
    ) -> Result<Response<DiscoveryResponse>, Status> {
        let req = request.into_inner();
        let key = self.hasher.id(req.node.as_ref());
        let snapshot = self.cache.get(&key);
        let version = self.cache.version(&key);

        Ok(Response::new(DiscoveryResponse {
            version_info: version.to_string(),
            resources: self.encode(type_url, &snapshot),
            canary: false,
            type_url: type_url.to_string(),
            nonce: version.to_string(),
            control_plane: None,
            resource_errors: Vec::new(),
        }))
    }
}

macro_rules! discovery_service {
    ($service_name:ident, $trait_name:ident, $stream_assoc:ident, $stream_method:ident, $fetch_method:ident, $delta_method:ident, $delta_assoc:ident, $type_url:expr) => {
        #[derive(Clone)]
        pub struct $service_name {
            core: Arc<DiscoveryCore>,
        }

        impl $service_name {
            pub fn new(core: Arc<DiscoveryCore>) -> Self {
                Self { core }
            }
        }

        #[tonic::async_trait]
        impl $trait_name for $service_name {
            type $stream_assoc = DiscoveryStream;
            type $delta_assoc = DiscoveryStream;

            async fn $stream_method(
                &self,
                request: Request<Streaming<DiscoveryRequest>>,
            ) -> Result<Response<Self::$stream_assoc>, Status> {
                let stream = Arc::clone(&self.core).stream($type_url, request.into_inner());
                Ok(Response::new(stream))
            }

            async fn $fetch_method(
                &self,
                mut request: Request<DiscoveryRequest>,
            ) -> Result<Response<DiscoveryResponse>, Status> {
                request.get_mut().type_url = $type_url.to_string();
                self.core.fetch($type_url, request).await
            }

            async fn $delta_method(
                &self,
                _request: Request<
                    Streaming<envoy_types::pb::envoy::service::discovery::v3::DeltaDiscoveryRequest>,
                >,
            ) -> Result<Response<Self::$delta_assoc>, Status> {
                Err(Status::unimplemented("delta xDS is not implemented"))
            }
        }
    };
}

discovery_service!(
    ClusterService,
    ClusterDiscoveryService,
    StreamClustersStream,
    stream_clusters,
    fetch_clusters,
    delta_clusters,
    DeltaClustersStream,
    CLUSTER_TYPE_URL
);

discovery_service!(
    EndpointService,
    EndpointDiscoveryService,
    StreamEndpointsStream,
    stream_endpoints,
    fetch_endpoints,
    delta_endpoints,
    DeltaEndpointsStream,
    ENDPOINT_TYPE_URL
);

discovery_service!(
    ListenerService,
    ListenerDiscoveryService,
    StreamListenersStream,
    stream_listeners,
    fetch_listeners,
    delta_listeners,
    DeltaListenersStream,
    LISTENER_TYPE_URL
);

discovery_service!(
    RouteService,
    RouteDiscoveryService,
    StreamRoutesStream,
    stream_routes,
    fetch_routes,
    delta_routes,
    DeltaRoutesStream,
    ROUTE_TYPE_URL
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::XdsSnapshot;

    #[test]
    fn encode_picks_the_right_resource_family() {
        let core = DiscoveryCore::new(Arc::new(SnapshotCache::new()));
        let mut snapshot = XdsSnapshot::default();
        snapshot.clusters.insert("payments~orders-api".into(), Cluster::default());
        snapshot.routes.insert("http-routes".into(), RouteConfiguration::default());

        assert_eq!(core.encode(CLUSTER_TYPE_URL, &snapshot).len(), 1);
        assert_eq!(core.encode(ROUTE_TYPE_URL, &snapshot).len(), 1);
        assert_eq!(core.encode(ENDPOINT_TYPE_URL, &snapshot).len(), 0);
        assert_eq!(core.encode(LISTENER_TYPE_URL, &snapshot).len(), 0);
    }

    #[tokio::test]
    async fn fetch_returns_current_snapshot_version() {
        let cache = Arc::new(SnapshotCache::new());
        let mut snapshot = XdsSnapshot::default();
        snapshot.clusters.insert("payments~orders-api".into(), Cluster::default());
        cache.set("payments~edge-1", snapshot);

        let core = DiscoveryCore::new(cache);
        let mut fields = std::collections::HashMap::new();
        fields.insert(
            "role".to_string(),
            envoy_types::pb::google::protobuf::Value {
                kind: Some(envoy_types::pb::google::protobuf::value::Kind::StringValue(
                    "payments~edge-1".to_string(),
                )),
            },
        );
        let req = Request::new(DiscoveryRequest {
            version_info: String::new(),
            node: Some(envoy_types::pb::envoy::config::core::v3::Node {
                metadata: Some(envoy_types::pb::google::protobuf::Struct { fields }),
                ..Default::default()
            }),
            resource_names: Vec::new(),
            response_nonce: String::new(),
            error_detail: None,
            type_url: CLUSTER_TYPE_URL.to_string(),
        });

        let response = core.fetch(CLUSTER_TYPE_URL, req).await.unwrap().into_inner();
        assert_eq!(response.version_info, "1");
        assert_eq!(response.resources.len(), 1);
    }
}
