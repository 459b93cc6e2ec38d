use crate::{resolve, system_default};
use proptest::prelude::*;
use rc_core::{
    ConfigSource, FallbackConfig, FallbackMode, ModelRouterConfig, OrganizationConfig,
    OrganizationId, ProjectConfig, ProjectId, RoutingSettings, SemanticCacheSettings, UserId,
};

fn arb_mode() -> impl Strategy<Value = FallbackMode> {
    prop_oneof![
        Just(FallbackMode::Sequential),
        Just(FallbackMode::Parallel),
        Just(FallbackMode::Disabled),
    ]
}

fn arb_settings() -> impl Strategy<Value = RoutingSettings> {
    (
        proptest::option::of((0.0f64..=1.0, any::<bool>())),
        proptest::option::of((arb_mode(), 1u64..600_000, 0u32..=10)),
        any::<bool>(),
    )
        .prop_map(|(router, fallback, enabled)| RoutingSettings {
            model_router_config: router.map(|(cost_bias, cache_enabled)| ModelRouterConfig {
                cost_bias,
                semantic_cache: SemanticCacheSettings {
                    enabled: cache_enabled,
                    ..SemanticCacheSettings::default()
                },
            }),
            fallback_config: fallback.map(|(mode, timeout_ms, max_retries)| FallbackConfig {
                mode,
                timeout_ms,
                max_retries,
            }),
            enabled,
        })
}

fn org_row(settings: RoutingSettings) -> OrganizationConfig {
    OrganizationConfig {
        id: "oc".to_string(),
        organization_id: OrganizationId::new("org").unwrap(),
        settings,
        created_by: UserId::default(),
        updated_by: UserId::default(),
        created_at: 0,
        updated_at: 1,
    }
}

fn project_row(settings: RoutingSettings) -> ProjectConfig {
    ProjectConfig {
        id: "pc".to_string(),
        organization_id: OrganizationId::new("org").unwrap(),
        project_id: ProjectId::new("p").unwrap(),
        settings,
        created_by: UserId::default(),
        updated_by: UserId::default(),
        created_at: 0,
        updated_at: 2,
    }
}

proptest! {
    #[test]
    fn test_project_wins_regardless_of_org(
        org in proptest::option::of(arb_settings()),
        project in arb_settings(),
    ) {
        let org = org.map(org_row);
        let project = project_row(project);

        let effective = resolve(org.as_ref(), Some(&project));

        prop_assert_eq!(effective.source, ConfigSource::Project);
        prop_assert_eq!(effective.settings, project.settings);
    }

    #[test]
    fn test_org_used_only_when_project_absent(org in arb_settings()) {
        let org = org_row(org);

        let effective = resolve(Some(&org), None);

        prop_assert_eq!(effective.source, ConfigSource::Organization);
        prop_assert_eq!(effective.settings, org.settings);
    }

    #[test]
    fn test_resolution_is_deterministic(
        org in proptest::option::of(arb_settings()),
        project in proptest::option::of(arb_settings()),
    ) {
        let org = org.map(org_row);
        let project = project.map(project_row);

        let first = resolve(org.as_ref(), project.as_ref());
        let second = resolve(org.as_ref(), project.as_ref());

        prop_assert_eq!(&first, &second);
        prop_assert_eq!(
            first.source == ConfigSource::Default,
            org.is_none() && project.is_none()
        );
        if first.source == ConfigSource::Default {
            prop_assert_eq!(first, system_default());
        }
    }
}
