//! Per-endpoint label construction: tag and data-center membership flags.

use crate::domain::{CatalogService, Upstream, DC_LABEL_PREFIX, TAG_LABEL_PREFIX};
use std::collections::{BTreeMap, BTreeSet};

/// Builds the `tag:*` and `dc:*` label maps for one catalog instance, given
/// every upstream tracking its service name.
///
/// The tag universe is the union of each upstream's [`ServiceRegistrySpec::tag_union`]
/// (subset tags if set, else instance tags); the data-center universe is the
/// union of each upstream's configured data centers plus the instance's own.
/// Every tag/dc in the respective universe gets a `"1"`/`"0"` membership flag,
/// regardless of which specific upstream contributed it.
pub fn build_labels(
    upstreams: &[Upstream],
    service: &CatalogService,
) -> (BTreeMap<String, String>, BTreeMap<String, String>) {
    let mut tag_universe: BTreeSet<String> = BTreeSet::new();
    let mut dc_universe: BTreeSet<String> = BTreeSet::new();
    dc_universe.insert(service.data_center.clone());

    for upstream in upstreams {
        if let Some(spec) = upstream.as_service_registry() {
            tag_universe.extend(spec.tag_union().iter().cloned());
            dc_universe.extend(spec.data_centers.iter().cloned());
        }
    }

    let tag_labels = tag_universe
        .into_iter()
        .map(|tag| {
            let present = if service.tags.contains(&tag) { "1" } else { "0" };
            (format!("{TAG_LABEL_PREFIX}{tag}"), present.to_string())
        })
        .collect();

    let dc_labels = dc_universe
        .into_iter()
        .map(|dc| {
            let present = if dc == service.data_center { "1" } else { "0" };
            (format!("{DC_LABEL_PREFIX}{dc}"), present.to_string())
        })
        .collect();

    (tag_labels, dc_labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ServiceRegistrySpec, UpstreamKind, UpstreamRef};

    fn upstream(dcs: &[&str], instance_tags: &[&str], subset: Option<&[&str]>) -> Upstream {
        Upstream::new(
            UpstreamRef::new("payments", "svc"),
            UpstreamKind::ServiceRegistry(ServiceRegistrySpec {
                service_name: "svc".into(),
                data_centers: dcs.iter().map(|s| s.to_string()).collect(),
                instance_tags: instance_tags.iter().map(|s| s.to_string()).collect(),
                subset_tags: subset.map(|tags| tags.iter().map(|s| s.to_string()).collect()),
                use_tls: false,
            }),
        )
    }

    fn service(dc: &str, tags: &[&str]) -> CatalogService {
        CatalogService {
            service_name: "svc".into(),
            instance_id: "svc-1".into(),
            node_address: "10.0.0.1".into(),
            service_address: String::new(),
            data_center: dc.into(),
            tags: tags.iter().map(|s| s.to_string()).collect(),
            port: 80,
            modify_index: 1,
        }
    }

    #[test]
    fn subset_tags_override_instance_tags_in_union() {
        let u = upstream(&["dc-1"], &["primary", "secondary"], Some(&["canary"]));
        let svc = service("dc-1", &["canary"]);
        let (tags, _) = build_labels(std::slice::from_ref(&u), &svc);
        assert_eq!(tags.get("tag:canary").map(String::as_str), Some("1"));
        assert!(!tags.contains_key("tag:primary"));
    }

    #[test]
    fn dc_union_includes_instance_dc_even_if_unconfigured() {
        let u = upstream(&["dc-1"], &[], None);
        let svc = service("dc-9", &[]);
        let (_, dcs) = build_labels(std::slice::from_ref(&u), &svc);
        assert_eq!(dcs.get("dc:dc-1").map(String::as_str), Some("0"));
        assert_eq!(dcs.get("dc:dc-9").map(String::as_str), Some("1"));
    }
}
