//! Ordered snapshot post-processors that run after translation and before
//! publish. Grounded in `snapshot_sanitizer.go`'s `XdsSanitizers` chain: each
//! sanitizer runs in registration order, and the first one to fail aborts the
//! whole publish — not an accumulate-all-errors pattern.

use crate::domain::{ReportSet, XdsSnapshot};
use crate::errors::Result;
use crate::store::ApiSnapshot;

/// One snapshot post-processor. May mutate the snapshot and/or the report
/// set; returning `Err` aborts the whole chain.
pub trait XdsSanitizer: Send + Sync {
    fn sanitize(
        &self,
        declared: &ApiSnapshot,
        snapshot: XdsSnapshot,
        reports: &mut ReportSet,
    ) -> Result<XdsSnapshot>;
}

/// Ordered sequence of sanitizers, folded left to right with early-return on
/// the first error — mirrors the Go original's `SanitizeSnapshot` loop
/// exactly (not a "collect all errors" reducer).
#[derive(Default)]
pub struct SanitizerChain {
    sanitizers: Vec<Box<dyn XdsSanitizer>>,
}

impl SanitizerChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, sanitizer: Box<dyn XdsSanitizer>) -> Self {
        self.sanitizers.push(sanitizer);
        self
    }

    pub fn sanitize(
        &self,
        declared: &ApiSnapshot,
        mut snapshot: XdsSnapshot,
        reports: &mut ReportSet,
    ) -> Result<XdsSnapshot> {
        for sanitizer in &self.sanitizers {
            snapshot = sanitizer.sanitize(declared, snapshot, reports)?;
        }
        Ok(snapshot)
    }
}

/// Removes the cluster (and its load assignment) for any upstream whose
/// report carries errors, then demotes those errors to warnings so the rest
/// of the snapshot still publishes.
pub struct UpstreamRemovingSanitizer;

impl XdsSanitizer for UpstreamRemovingSanitizer {
    fn sanitize(
        &self,
        _declared: &ApiSnapshot,
        mut snapshot: XdsSnapshot,
        reports: &mut ReportSet,
    ) -> Result<XdsSnapshot> {
        for (resource_id, report) in reports.iter_mut() {
            if report.errors.is_empty() {
                continue;
            }
            // Resource identities for upstreams are their `UpstreamRef`'s
            // `Display` form (`<namespace>~<name>`), which is also the
            // cluster name (`UpstreamRef::cluster_name`).
            snapshot.remove_cluster(resource_id);
            report.demote_errors_to_warnings();
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Report;
    use envoy_types::pb::envoy::config::cluster::v3::Cluster;
    use envoy_types::pb::envoy::config::endpoint::v3::ClusterLoadAssignment;

    fn declared() -> ApiSnapshot {
        ApiSnapshot::default()
    }

    #[test]
    fn removes_cluster_and_demotes_errors() {
        let mut snapshot = XdsSnapshot::default();
        snapshot.clusters.insert("payments~orders-api".into(), Cluster::default());
        snapshot.endpoints.insert("payments~orders-api".into(), ClusterLoadAssignment::default());

        let mut reports = ReportSet::new();
        let mut report = Report::default();
        report.add_error("no healthy endpoints");
        reports.insert("payments~orders-api".into(), report);

        let sanitized =
            UpstreamRemovingSanitizer.sanitize(&declared(), snapshot, &mut reports).unwrap();

        assert!(!sanitized.clusters.contains_key("payments~orders-api"));
        assert!(!sanitized.endpoints.contains_key("payments~orders-api"));
        assert!(reports["payments~orders-api"].errors.is_empty());
        assert_eq!(reports["payments~orders-api"].warnings, vec!["no healthy endpoints".to_string()]);
    }

    #[test]
    fn leaves_error_free_resources_untouched() {
        let mut snapshot = XdsSnapshot::default();
        snapshot.clusters.insert("payments~orders-api".into(), Cluster::default());

        let mut reports = ReportSet::new();
        reports.insert("payments~orders-api".into(), Report::default());

        let sanitized =
            UpstreamRemovingSanitizer.sanitize(&declared(), snapshot, &mut reports).unwrap();
        assert!(sanitized.clusters.contains_key("payments~orders-api"));
    }

    struct FailingSanitizer;
    impl XdsSanitizer for FailingSanitizer {
        fn sanitize(
            &self,
            _declared: &ApiSnapshot,
            _snapshot: XdsSnapshot,
            _reports: &mut ReportSet,
        ) -> Result<XdsSnapshot> {
            Err(crate::errors::Error::sanitizer("deliberately failing"))
        }
    }

    struct MarkerSanitizer;
    impl XdsSanitizer for MarkerSanitizer {
        fn sanitize(
            &self,
            _declared: &ApiSnapshot,
            mut snapshot: XdsSnapshot,
            _reports: &mut ReportSet,
        ) -> Result<XdsSnapshot> {
            snapshot.clusters.insert("marker".into(), Cluster::default());
            Ok(snapshot)
        }
    }

    #[test]
    fn chain_short_circuits_on_first_error() {
        let chain = SanitizerChain::new().push(Box::new(FailingSanitizer)).push(Box::new(MarkerSanitizer));
        let mut reports = ReportSet::new();

        let result = chain.sanitize(&declared(), XdsSnapshot::default(), &mut reports);
        assert!(result.is_err());
    }

    #[test]
    fn chain_runs_sanitizers_in_registration_order() {
        let chain = SanitizerChain::new().push(Box::new(MarkerSanitizer));
        let mut reports = ReportSet::new();

        let result = chain.sanitize(&declared(), XdsSnapshot::default(), &mut reports).unwrap();
        assert!(result.clusters.contains_key("marker"));
    }
}
