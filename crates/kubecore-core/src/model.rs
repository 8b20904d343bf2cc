//! Static model of the KubeCore platform graph.
//!
//! Pure data, no I/O: which kinds exist, which kinds may see which,
//! the outbound reference edges, cardinalities, reverse-search triples
//! and the declared transitive chains. Changing the platform surface is
//! a change to these tables, not to engine code.

use crate::types::{Cardinality, RelationType, ResourceKind};

pub const GITHUB_API_VERSION: &str = "github.platform.kubecore.io/v1alpha1";
pub const NETWORK_API_VERSION: &str = "network.platform.kubecore.io/v1alpha1";
pub const PLATFORM_API_VERSION: &str = "platform.kubecore.io/v1alpha1";
pub const APP_API_VERSION: &str = "app.kubecore.io/v1alpha1";

/// One candidate searcher for reverse discovery: resources of `kind`
/// may point at the target through `spec.<ref_field>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearcherSpec {
    pub kind: ResourceKind,
    pub api_version: &'static str,
    pub ref_field: &'static str,
}

const fn searcher(
    kind: ResourceKind,
    api_version: &'static str,
    ref_field: &'static str,
) -> SearcherSpec {
    SearcherSpec {
        kind,
        api_version,
        ref_field,
    }
}

/// A declared multi-hop chain: following `ref_fields` in order from a
/// source resource terminates at resources of `target` kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSpec {
    pub target: ResourceKind,
    pub ref_fields: &'static [&'static str],
}

/// Kinds a requestor of the given kind may see in a direct response.
pub fn accessible_kinds(kind: &ResourceKind) -> &'static [ResourceKind] {
    use ResourceKind::*;
    match kind {
        XApp => &[
            XKubEnv,
            XQualityGate,
            XGitHubProject,
            XGitHubApp,
            XKubeCluster,
            XKubeNet,
            XKubeSystem,
        ],
        XKubeSystem => &[XKubeCluster, XKubEnv, XGitHubProject, XKubeNet, XGitHubProvider],
        XKubEnv => &[XKubeCluster, XQualityGate, XGitHubProject, XKubeNet],
        XKubeCluster => &[XGitHubProject, XKubeNet, XGitHubProvider],
        XGitHubProject => &[XGitHubProvider],
        XGitHubApp => &[XGitHubProject, XGitHubProvider],
        // Quality gates and networks are referenced by other resources,
        // not the other way around; providers are top-level.
        _ => &[],
    }
}

/// Declared outbound relationship edges per kind.
pub fn outbound_edges(
    kind: &ResourceKind,
) -> &'static [(RelationType, &'static [ResourceKind])] {
    use RelationType::*;
    use ResourceKind::*;
    match kind {
        XGitHubProvider => &[(Owns, &[XGitHubProject])],
        XGitHubProject => &[(BelongsTo, &[XGitHubProvider]), (Owns, &[XKubeCluster, XGitHubApp])],
        XKubeNet => &[(Supports, &[XKubeCluster])],
        XKubeCluster => &[
            (BelongsTo, &[XGitHubProject]),
            (Uses, &[XKubeNet]),
            (Hosts, &[XKubeSystem, XKubEnv]),
        ],
        XKubeSystem => &[(RunsOn, &[XKubeCluster])],
        XKubEnv => &[(RunsOn, &[XKubeCluster]), (Uses, &[XQualityGate])],
        XQualityGate => &[(AppliesTo, &[XKubEnv, XApp])],
        XGitHubApp => &[(BelongsTo, &[XGitHubProject]), (Sources, &[XApp])],
        XApp => &[
            (BelongsTo, &[XGitHubProject]),
            (SourcedBy, &[XGitHubApp]),
            (DeploysTo, &[XKubEnv]),
        ],
        Other(_) => &[],
    }
}

/// The declared relation type between two kinds, if any.
pub fn relation_between(from: &ResourceKind, to: &ResourceKind) -> Option<RelationType> {
    outbound_edges(from)
        .iter()
        .find(|(_, targets)| targets.contains(to))
        .map(|(relation, _)| *relation)
}

/// Declared cardinality of a relationship between two kinds.
pub fn cardinality(from: &ResourceKind, to: &ResourceKind) -> Option<Cardinality> {
    use Cardinality::*;
    use ResourceKind::*;
    let value = match (from, to) {
        (XGitHubProvider, XGitHubProject) => OneToMany,
        (XGitHubProject, XKubeCluster) => OneToOne,
        (XGitHubProject, XGitHubApp) => OneToMany,
        (XKubeNet, XKubeCluster) => OneToMany,
        (XKubeCluster, XKubeSystem) => OneToOne,
        (XKubeCluster, XKubEnv) => OneToMany,
        (XGitHubApp, XApp) => OneToOne,
        (XApp, XKubEnv) => ManyToMany,
        (XQualityGate, XKubEnv) => ManyToMany,
        (XQualityGate, XApp) => ManyToMany,
        _ => return None,
    };
    Some(value)
}

/// Field paths under `.spec` that carry references for the given kind.
pub fn reference_fields(kind: &ResourceKind) -> &'static [&'static str] {
    use ResourceKind::*;
    match kind {
        XGitHubProject => &["githubProviderRef"],
        XGitHubApp => &["githubProjectRef"],
        XKubeCluster => &["githubProjectRef", "kubeNetRef"],
        XKubeSystem => &["kubeClusterRef"],
        XKubEnv => &["kubeClusterRef", "qualityGates"],
        XApp => &["githubProjectRef", "kubenvRef", "qualityGates"],
        _ => &[],
    }
}

/// Searcher triples for reverse discovery: who may point at `target`?
pub fn reverse_search(target: &ResourceKind) -> &'static [SearcherSpec] {
    use ResourceKind::*;
    match target {
        XGitHubProject => {
            static ARR: [SearcherSpec; 5] = [
                searcher(XKubeCluster, PLATFORM_API_VERSION, "githubProjectRef"),
                searcher(XKubEnv, PLATFORM_API_VERSION, "githubProjectRef"),
                searcher(XApp, APP_API_VERSION, "githubProjectRef"),
                searcher(XGitHubApp, GITHUB_API_VERSION, "githubProjectRef"),
                searcher(XQualityGate, PLATFORM_API_VERSION, "githubProjectRef"),
            ];
            &ARR
        }
        XKubeCluster => {
            static ARR: [SearcherSpec; 2] = [
                searcher(XKubeSystem, PLATFORM_API_VERSION, "kubeClusterRef"),
                searcher(XKubEnv, PLATFORM_API_VERSION, "kubeClusterRef"),
            ];
            &ARR
        }
        XKubeNet => {
            static ARR: [SearcherSpec; 1] =
                [searcher(XKubeCluster, PLATFORM_API_VERSION, "kubeNetRef")];
            &ARR
        }
        XQualityGate => {
            static ARR: [SearcherSpec; 2] = [
                searcher(XKubEnv, PLATFORM_API_VERSION, "qualityGates"),
                searcher(XApp, APP_API_VERSION, "qualityGates"),
            ];
            &ARR
        }
        _ => &[],
    }
}

/// Requestor kinds that trigger reverse discovery.
pub fn is_hub_kind(kind: &ResourceKind) -> bool {
    use ResourceKind::*;
    matches!(kind, XGitHubProject | XKubeCluster | XKubeNet | XQualityGate)
}

/// Declared transitive chains per source kind, shortest first.
pub fn transitive_chains(source: &ResourceKind) -> &'static [ChainSpec] {
    use ResourceKind::*;
    match source {
        XGitHubProject => &[
            ChainSpec { target: XKubeCluster, ref_fields: &["githubProjectRef"] },
            ChainSpec { target: XGitHubApp, ref_fields: &["githubProjectRef"] },
            ChainSpec { target: XKubEnv, ref_fields: &["githubProjectRef", "kubeClusterRef"] },
            ChainSpec { target: XKubeSystem, ref_fields: &["githubProjectRef", "kubeClusterRef"] },
            ChainSpec {
                target: XApp,
                ref_fields: &["githubProjectRef", "kubeClusterRef", "kubenvRef"],
            },
        ],
        XKubeCluster => &[
            ChainSpec { target: XKubEnv, ref_fields: &["kubeClusterRef"] },
            ChainSpec { target: XKubeSystem, ref_fields: &["kubeClusterRef"] },
            ChainSpec { target: XApp, ref_fields: &["kubeClusterRef", "kubenvRef"] },
        ],
        XKubEnv => &[
            ChainSpec { target: XApp, ref_fields: &["kubenvRef"] },
            ChainSpec { target: XQualityGate, ref_fields: &["qualityGates"] },
        ],
        XApp => &[
            ChainSpec { target: XKubEnv, ref_fields: &["kubenvRef"] },
            ChainSpec { target: XGitHubApp, ref_fields: &["githubProjectRef"] },
        ],
        _ => &[],
    }
}

/// `(kind, apiVersion)` pairs whose `.spec` carries the given reference
/// field. Used by back-reference search inside the transitive engine.
pub fn searchers_for_field(ref_field: &str) -> &'static [(ResourceKind, &'static str)] {
    use ResourceKind::*;
    match ref_field {
        "githubProjectRef" => &[
            (XKubeCluster, PLATFORM_API_VERSION),
            (XGitHubApp, GITHUB_API_VERSION),
            (XApp, APP_API_VERSION),
            (XQualityGate, PLATFORM_API_VERSION),
        ],
        "kubeClusterRef" => &[
            (XKubEnv, PLATFORM_API_VERSION),
            (XKubeSystem, PLATFORM_API_VERSION),
        ],
        "kubenvRef" => &[(XApp, APP_API_VERSION)],
        "kubeNetRef" => &[(XKubeCluster, PLATFORM_API_VERSION)],
        "qualityGates" => &[
            (XKubEnv, PLATFORM_API_VERSION),
            (XApp, APP_API_VERSION),
        ],
        _ => &[],
    }
}

/// apiVersion for a platform kind.
pub fn api_version(kind: &ResourceKind) -> &'static str {
    use ResourceKind::*;
    match kind {
        XGitHubProvider | XGitHubProject | XGitHubApp => GITHUB_API_VERSION,
        XKubeNet => NETWORK_API_VERSION,
        XKubeCluster | XKubeSystem | XKubEnv | XQualityGate => PLATFORM_API_VERSION,
        XApp => APP_API_VERSION,
        Other(_) => "v1",
    }
}

/// External short form used in queries and schema-block keys.
pub fn short_name(kind: &ResourceKind) -> &'static str {
    use ResourceKind::*;
    match kind {
        XGitHubProvider => "githubProvider",
        XGitHubProject => "githubProject",
        XGitHubApp => "githubApp",
        XKubeNet => "kubeNet",
        XKubeCluster => "kubeCluster",
        XKubeSystem => "kubeSystem",
        XKubEnv => "kubEnv",
        XQualityGate => "qualityGate",
        XApp => "app",
        Other(_) => "unknown",
    }
}

/// Reverse of [`short_name`].
pub fn kind_for_short_name(name: &str) -> Option<ResourceKind> {
    use ResourceKind::*;
    let kind = match name {
        "githubProvider" => XGitHubProvider,
        "githubProject" => XGitHubProject,
        "githubApp" => XGitHubApp,
        "kubeNet" => XKubeNet,
        "kubeCluster" => XKubeCluster,
        "kubeSystem" => XKubeSystem,
        "kubEnv" => XKubEnv,
        "qualityGate" => XQualityGate,
        "app" => XApp,
        _ => return None,
    };
    Some(kind)
}

/// Key under `context.references` listing refs of this kind,
/// e.g. `XApp -> appRefs`.
pub fn ref_list_key(kind: &ResourceKind) -> &'static str {
    use ResourceKind::*;
    match kind {
        XGitHubProvider => "githubProviderRefs",
        XGitHubProject => "githubProjectRefs",
        XGitHubApp => "githubAppRefs",
        XKubeNet => "kubeNetRefs",
        XKubeCluster => "kubeClusterRefs",
        XKubeSystem => "kubeSystemRefs",
        XKubEnv => "kubEnvRefs",
        XQualityGate => "qualityGateRefs",
        XApp => "appRefs",
        Other(_) => "resourceRefs",
    }
}

/// Human description per platform kind, used in relationship metadata
/// and insights.
pub fn description(kind: &ResourceKind) -> &'static str {
    use ResourceKind::*;
    match kind {
        XGitHubProvider => "Contains credentials and semantics for GitHub organization",
        XGitHubProject => "Software product with GitOps repository, teams, and permissions",
        XKubeNet => "Network infrastructure (VPC, DNS) shared across multiple projects",
        XKubeCluster => "Kubernetes cluster (1:1 with GitHubProject, references KubeNet)",
        XKubeSystem => "Platform tools runtime (ArgoCD, Crossplane, etc.) on KubeCluster",
        XKubEnv => "Deployment environment with app node groups on KubeCluster",
        XQualityGate => "Reusable validation workflows applicable to environments/apps",
        XGitHubApp => "Source control for software component (1:1 with App)",
        XApp => "Kubernetes application deployment semantic (references multiple KubEnvs)",
        Other(_) => "No description available",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chains_are_well_typed_against_searcher_tables() {
        for kind in ResourceKind::PLATFORM_KINDS {
            for chain in transitive_chains(&kind) {
                assert!(chain.ref_fields.len() <= 3, "chain too deep for {}", kind);
                for field in chain.ref_fields {
                    assert!(
                        !searchers_for_field(field).is_empty(),
                        "chain field {} has no searcher table entry",
                        field
                    );
                }
                // The final hop must be able to yield the declared target.
                let last = chain.ref_fields.last().unwrap();
                assert!(
                    searchers_for_field(last)
                        .iter()
                        .any(|(kind, _)| *kind == chain.target),
                    "chain target {} unreachable via {}",
                    chain.target,
                    last
                );
            }
        }
    }

    #[test]
    fn reverse_search_fields_exist_on_searcher_kinds() {
        for kind in ResourceKind::PLATFORM_KINDS {
            for spec in reverse_search(&kind) {
                assert!(
                    reference_fields(&spec.kind).contains(&spec.ref_field),
                    "{} does not declare field {}",
                    spec.kind,
                    spec.ref_field
                );
            }
        }
    }

    #[test]
    fn relation_and_cardinality_tables_agree() {
        use ResourceKind::*;
        assert_eq!(relation_between(&XApp, &XKubEnv), Some(RelationType::DeploysTo));
        assert_eq!(cardinality(&XApp, &XKubEnv), Some(Cardinality::ManyToMany));
        assert_eq!(
            cardinality(&XGitHubProject, &XKubeCluster),
            Some(Cardinality::OneToOne)
        );
        assert_eq!(cardinality(&XKubeNet, &XApp), None);
    }

    #[test]
    fn short_names_round_trip() {
        for kind in ResourceKind::PLATFORM_KINDS {
            assert_eq!(kind_for_short_name(short_name(&kind)), Some(kind));
        }
        assert_eq!(kind_for_short_name("nonsense"), None);
    }

    #[test]
    fn unknown_kind_has_empty_tables() {
        let kind = ResourceKind::Other("ConfigMap".to_string());
        assert!(accessible_kinds(&kind).is_empty());
        assert!(outbound_edges(&kind).is_empty());
        assert!(transitive_chains(&kind).is_empty());
        assert!(reverse_search(&kind).is_empty());
    }
}
