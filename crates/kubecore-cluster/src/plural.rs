//! Plural-name derivation for API paths.

/// Derive the resource plural used in REST paths from a kind name.
/// Irregular kinds are tabled; the rest follow s/es/ies rules.
pub fn plural_form(kind: &str) -> String {
    match kind {
        "Endpoints" => return "endpoints".to_string(),
        "NetworkPolicy" => return "networkpolicies".to_string(),
        "PodSecurityPolicy" => return "podsecuritypolicies".to_string(),
        _ => {}
    }

    let lower = kind.to_lowercase();
    if lower.ends_with('s') {
        format!("{}es", lower)
    } else if let Some(stem) = lower.strip_suffix('y') {
        format!("{}ies", stem)
    } else {
        format!("{}s", lower)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn irregular_kinds_are_tabled() {
        assert_eq!(plural_form("Endpoints"), "endpoints");
        assert_eq!(plural_form("NetworkPolicy"), "networkpolicies");
    }

    #[test]
    fn regular_rules_apply() {
        assert_eq!(plural_form("XApp"), "xapps");
        assert_eq!(plural_form("XKubeCluster"), "xkubeclusters");
        assert_eq!(plural_form("Ingress"), "ingresses");
        assert_eq!(plural_form("XGitHubApp"), "xgithubapps");
    }
}
