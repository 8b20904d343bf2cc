//! Declarative insights: recommendations, validation rules and
//! suggested references keyed on the requestor kind and the schemas
//! present in the assembled context.

use kubecore_core::ResourceKind;
use serde_json::Value;
use tracing::debug;

use crate::context::{
    Impact, Insights, PlatformContext, Recommendation, RuleSeverity, SuggestedReference,
    ValidationRule,
};

pub struct InsightsEngine;

impl InsightsEngine {
    pub fn new() -> Self {
        Self
    }

    /// Pure function over the assembled context and the requestor kind.
    pub fn generate(&self, context: &PlatformContext, kind: &ResourceKind) -> Insights {
        let mut insights = match kind {
            ResourceKind::XApp => app_insights(context),
            ResourceKind::XKubeSystem => kubesystem_insights(context),
            ResourceKind::XKubEnv => kubenv_insights(context),
            _ => generic_insights(),
        };

        cross_cutting_insights(context, kind, &mut insights);
        debug!(
            kind = %kind,
            recommendations = insights.recommendations.len(),
            "generated insights"
        );
        insights
    }
}

impl Default for InsightsEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn recommendation(
    category: &str,
    suggestion: impl Into<String>,
    impact: Impact,
    rationale: &str,
) -> Recommendation {
    Recommendation {
        category: category.to_string(),
        suggestion: suggestion.into(),
        impact,
        rationale: rationale.to_string(),
    }
}

fn rule(name: &str, description: &str, severity: RuleSeverity) -> ValidationRule {
    ValidationRule {
        rule: name.to_string(),
        description: description.to_string(),
        severity,
    }
}

fn suggested(target: &str, purpose: &str, description: &str) -> SuggestedReference {
    SuggestedReference {
        target: target.to_string(),
        purpose: purpose.to_string(),
        description: description.to_string(),
    }
}

fn app_insights(context: &PlatformContext) -> Insights {
    let mut insights = Insights {
        recommendations: vec![
            recommendation(
                "resource-optimization",
                "Consider overriding memory requests for Python applications",
                Impact::Medium,
                "Python applications often require more memory than default allocations",
            ),
            recommendation(
                "resource-optimization",
                "Enable CPU limits for consistent performance",
                Impact::Low,
                "CPU limits prevent resource contention in shared environments",
            ),
            recommendation(
                "security",
                "Enable network policies in production environments",
                Impact::High,
                "Network policies provide micro-segmentation and reduce attack surface",
            ),
            recommendation(
                "security",
                "Configure security contexts with non-root user",
                Impact::High,
                "Non-root containers reduce privilege escalation risks",
            ),
        ],
        validation_rules: vec![
            rule(
                "image-tag-required",
                "Container images must specify explicit tags (not 'latest')",
                RuleSeverity::Warning,
            ),
            rule(
                "resource-limits-required",
                "All containers must specify resource limits",
                RuleSeverity::Error,
            ),
        ],
        suggested_references: vec![
            suggested(
                "kubEnv",
                "deployment-targets",
                "Reference environments where this app can be deployed",
            ),
            suggested(
                "githubProject",
                "source-code",
                "Reference to the source code repository",
            ),
        ],
    };

    // Environment-specific recommendations from resolved instances.
    if let Some(block) = context.available_schemas.get("kubEnv") {
        for instance in &block.instances {
            match instance.summary.get("environmentType").and_then(Value::as_str) {
                Some("prod") => insights.recommendations.push(recommendation(
                    "reliability",
                    format!(
                        "Enable health checks for production environment {}",
                        instance.name
                    ),
                    Impact::High,
                    "Health checks enable automatic recovery and improve availability",
                )),
                Some("dev") => insights.recommendations.push(recommendation(
                    "development",
                    format!(
                        "Consider enabling debug mode for development environment {}",
                        instance.name
                    ),
                    Impact::Low,
                    "Debug mode provides better troubleshooting capabilities",
                )),
                _ => {}
            }
        }
    }

    insights
}

fn kubesystem_insights(context: &PlatformContext) -> Insights {
    let mut insights = Insights {
        recommendations: vec![
            recommendation(
                "infrastructure",
                "Enable cluster autoscaling for dynamic workloads",
                Impact::Medium,
                "Autoscaling optimizes resource utilization and reduces costs",
            ),
            recommendation(
                "monitoring",
                "Deploy comprehensive monitoring stack",
                Impact::High,
                "Monitoring enables proactive issue detection and resolution",
            ),
            recommendation(
                "security",
                "Enable Pod Security Standards at cluster level",
                Impact::High,
                "Pod Security Standards provide baseline security configurations",
            ),
            recommendation(
                "security",
                "Configure RBAC with least privilege principle",
                Impact::High,
                "RBAC limits access based on actual requirements",
            ),
        ],
        validation_rules: vec![
            rule(
                "system-component-health",
                "All system components must pass health checks",
                RuleSeverity::Error,
            ),
            rule(
                "backup-configuration",
                "Backup strategies must be configured for persistent data",
                RuleSeverity::Warning,
            ),
        ],
        suggested_references: vec![
            suggested(
                "kubeCluster",
                "infrastructure",
                "Reference to the underlying cluster infrastructure",
            ),
            suggested(
                "kubEnv",
                "hosted-environments",
                "Reference environments hosted by this system",
            ),
        ],
    };

    if let Some(block) = context.available_schemas.get("kubeCluster") {
        for instance in &block.instances {
            let version = instance
                .summary
                .get("version")
                .and_then(Value::as_str)
                .unwrap_or("");
            if !version.is_empty() && version < "1.27.0" {
                insights.recommendations.push(recommendation(
                    "maintenance",
                    format!(
                        "Upgrade cluster {} to supported Kubernetes version",
                        instance.name
                    ),
                    Impact::High,
                    "Older versions may have security vulnerabilities and missing features",
                ));
            }
        }
    }

    insights
}

fn kubenv_insights(context: &PlatformContext) -> Insights {
    let mut insights = Insights {
        recommendations: vec![
            recommendation(
                "configuration",
                "Define environment-specific resource quotas",
                Impact::Medium,
                "Resource quotas prevent resource exhaustion and ensure fair allocation",
            ),
            recommendation(
                "configuration",
                "Configure environment-specific network policies",
                Impact::Medium,
                "Network policies provide environment isolation and security",
            ),
            recommendation(
                "monitoring",
                "Enable application performance monitoring (APM)",
                Impact::Medium,
                "APM provides visibility into application behavior in the environment",
            ),
            recommendation(
                "backup",
                "Configure automated backup for persistent volumes",
                Impact::High,
                "Automated backups protect against data loss",
            ),
        ],
        validation_rules: vec![
            rule(
                "environment-type-consistency",
                "Environment type must match deployment requirements",
                RuleSeverity::Error,
            ),
            rule(
                "resource-limits-defined",
                "Environment must define resource limits and quotas",
                RuleSeverity::Warning,
            ),
        ],
        suggested_references: vec![
            suggested(
                "kubeCluster",
                "infrastructure",
                "Reference to the cluster hosting this environment",
            ),
            suggested(
                "qualityGate",
                "validation",
                "Reference quality gates applied to this environment",
            ),
        ],
    };

    if context.available_schemas.contains_key("qualityGate") {
        insights.recommendations.push(recommendation(
            "quality-assurance",
            "Ensure all required quality gates are configured",
            Impact::High,
            "Quality gates maintain deployment standards and prevent issues",
        ));
    } else {
        insights.recommendations.push(recommendation(
            "quality-assurance",
            "Configure quality gates for deployment validation",
            Impact::High,
            "Quality gates are essential for maintaining deployment quality",
        ));
    }

    insights
}

fn generic_insights() -> Insights {
    Insights {
        recommendations: vec![
            recommendation(
                "documentation",
                "Maintain comprehensive resource documentation",
                Impact::Low,
                "Documentation improves maintainability and knowledge sharing",
            ),
            recommendation(
                "monitoring",
                "Implement basic health checks and monitoring",
                Impact::Medium,
                "Monitoring enables proactive issue detection",
            ),
        ],
        ..Default::default()
    }
}

fn expected_relationships(kind: &ResourceKind) -> &'static [&'static str] {
    use ResourceKind::*;
    match kind {
        XApp => &["kubEnv", "githubProject"],
        XKubeSystem => &["kubeCluster", "kubEnv"],
        XKubEnv => &["kubeCluster", "qualityGate"],
        XKubeCluster => &["kubeNet", "githubProject"],
        XGitHubProject => &["githubProvider"],
        _ => &[],
    }
}

fn cross_cutting_insights(context: &PlatformContext, kind: &ResourceKind, insights: &mut Insights) {
    for expected in expected_relationships(kind) {
        let declared = context
            .relationships
            .direct
            .iter()
            .any(|relation| relation.target == *expected);
        if !declared {
            insights.recommendations.push(recommendation(
                "architecture",
                format!("Consider establishing relationship with {}", expected),
                Impact::Medium,
                "Declared relationships provide additional context and capabilities",
            ));
        }
    }

    if context.available_schemas.is_empty() {
        insights.recommendations.push(recommendation(
            "context",
            "No related schemas available - consider adding references",
            Impact::Low,
            "Related schemas provide valuable context for operations",
        ));
    }

    insights.recommendations.push(recommendation(
        "compliance",
        "Ensure resource follows organizational naming conventions",
        Impact::Low,
        "Consistent naming improves discoverability and management",
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PlatformContext;

    #[test]
    fn app_insights_cover_security_and_optimization() {
        let context = PlatformContext::new("XApp", "art-api", "default");
        let insights = InsightsEngine::new().generate(&context, &ResourceKind::XApp);

        let categories: Vec<&str> = insights
            .recommendations
            .iter()
            .map(|r| r.category.as_str())
            .collect();
        assert!(categories.contains(&"security"));
        assert!(categories.contains(&"resource-optimization"));
        assert!(!insights.validation_rules.is_empty());
        assert!(insights
            .suggested_references
            .iter()
            .any(|s| s.target == "kubEnv"));
    }

    #[test]
    fn missing_expected_relationships_produce_architecture_hints() {
        let context = PlatformContext::new("XApp", "art-api", "default");
        let insights = InsightsEngine::new().generate(&context, &ResourceKind::XApp);
        let architecture: Vec<&Recommendation> = insights
            .recommendations
            .iter()
            .filter(|r| r.category == "architecture")
            .collect();
        assert_eq!(architecture.len(), 2, "kubEnv and githubProject are absent");
    }

    #[test]
    fn empty_context_adds_context_recommendation() {
        let context = PlatformContext::new("XKubeNet", "net", "default");
        let insights = InsightsEngine::new().generate(&context, &ResourceKind::XKubeNet);
        assert!(insights
            .recommendations
            .iter()
            .any(|r| r.category == "context"));
    }

    #[test]
    fn kubenv_quality_gate_hint_depends_on_schema_presence() {
        let context = PlatformContext::new("XKubEnv", "demo-dev", "test");
        let insights = InsightsEngine::new().generate(&context, &ResourceKind::XKubEnv);
        assert!(insights
            .recommendations
            .iter()
            .any(|r| r.suggestion.contains("Configure quality gates")));
    }
}
