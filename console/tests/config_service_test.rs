use std::sync::Arc;

use config::{CacheSettings, ClientConfig};
use console::{ConfigService, NewProvider, ProjectConfigForm};
use errors::{FormError, MutationError};
use rc_core::{
    CacheKey, ConfigEvent, ConfigRpc, ConfigSource, IdentityProvider, MutationKind,
    OrganizationId, RoutingSettings,
};
use storage::InMemoryConfigStore;
use testing::{
    FlakyRpc, GatedRpc, StaticIdentity, Verb, project_id, router_settings, seeded_store,
    unique_org_id, user_id,
};
use tokio::sync::broadcast::error::TryRecvError;

fn service_over(
    rpc: Arc<dyn ConfigRpc>,
    organization_id: &OrganizationId,
    config: &ClientConfig,
) -> ConfigService {
    let identity: Arc<dyn IdentityProvider> = Arc::new(StaticIdentity::new("alice", organization_id));
    ConfigService::new(rpc, identity, config)
}

fn set_cost_bias(settings: &mut RoutingSettings, cost_bias: f64) {
    if let Some(router) = settings.model_router_config.as_mut() {
        router.cost_bias = cost_bias;
    }
}

#[tokio::test]
async fn test_project_inherits_until_it_saves_an_override() {
    let org = unique_org_id();
    let service = service_over(seeded_store(&org, 0.3), &org, &ClientConfig::default());
    let mut events = service.subscribe();

    for project in ["p", "q"] {
        let effective = service
            .get_effective_config(&org, &project_id(project))
            .await
            .unwrap();
        assert_eq!(effective.source, ConfigSource::Organization);
        assert_eq!(effective.cost_bias(), Some(0.3));
    }

    let created = service
        .save_project_config(&org, &project_id("p"), router_settings(0.8))
        .await
        .unwrap();

    let p = service
        .get_effective_config(&org, &project_id("p"))
        .await
        .unwrap();
    assert_eq!(p.source, ConfigSource::Project);
    assert_eq!(p.cost_bias(), Some(0.8));
    assert_eq!(p.config_id.as_deref(), Some(created.id.as_str()));

    let q = service
        .get_effective_config(&org, &project_id("q"))
        .await
        .unwrap();
    assert_eq!(q.source, ConfigSource::Organization);
    assert_eq!(q.cost_bias(), Some(0.3));

    match events.try_recv().unwrap() {
        ConfigEvent::ProjectConfigChanged {
            project_id: changed,
            operation,
            ..
        } => {
            assert_eq!(changed, project_id("p"));
            assert_eq!(operation, MutationKind::Create);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_organization_write_refreshes_cached_effective_configs() {
    let org = unique_org_id();
    let service = service_over(seeded_store(&org, 0.3), &org, &ClientConfig::default());
    let effective_key = CacheKey::effective_config(&org, &project_id("p"));
    service
        .get_effective_config(&org, &project_id("p"))
        .await
        .unwrap();
    let mut events = service.subscribe();

    service
        .save_organization_config(&org, router_settings(0.4))
        .await
        .unwrap();

    let cached = service.cache().data(&effective_key).unwrap();
    assert_eq!(cached["modelRouterConfig"]["costBias"], 0.4);
    assert_eq!(cached["source"], "organization");
    assert_eq!(
        events.try_recv().unwrap().operation(),
        MutationKind::Update
    );
}

#[tokio::test]
async fn test_deleting_override_falls_back_to_organization() {
    let org = unique_org_id();
    let service = service_over(seeded_store(&org, 0.3), &org, &ClientConfig::default());
    service
        .save_project_config(&org, &project_id("p"), router_settings(0.8))
        .await
        .unwrap();

    service
        .delete_project_config(&org, &project_id("p"))
        .await
        .unwrap();

    let effective = service
        .get_effective_config(&org, &project_id("p"))
        .await
        .unwrap();
    assert_eq!(effective.source, ConfigSource::Organization);
    assert_eq!(effective.cost_bias(), Some(0.3));
    assert_eq!(
        service.project_config(&org, &project_id("p")).await.unwrap(),
        None
    );
}

#[tokio::test]
async fn test_failed_updates_restore_cache_exactly() {
    let org = unique_org_id();
    let flaky = Arc::new(FlakyRpc::new(seeded_store(&org, 0.3)));
    let service = service_over(flaky.clone(), &org, &ClientConfig::default());
    service
        .save_project_config(&org, &project_id("p"), router_settings(0.8))
        .await
        .unwrap();
    service.project_configs(&org).await.unwrap();

    let effective_key = CacheKey::effective_config(&org, &project_id("p"));
    let list_key = CacheKey::project_configs(&org);
    let effective_before = service.cache().data(&effective_key);
    let list_before = service.cache().data(&list_key);
    let mut events = service.subscribe();

    flaky.fail_next(Verb::Update, 3, MutationError::transport("connection reset"));
    for _ in 0..3 {
        let err = service
            .save_project_config(&org, &project_id("p"), router_settings(0.1))
            .await
            .unwrap_err();
        assert!(matches!(err, MutationError::Transport { .. }));

        assert_eq!(service.cache().data(&effective_key), effective_before);
        assert_eq!(service.cache().data(&list_key), list_before);
    }

    assert_eq!(flaky.calls(Verb::Update), 3);
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_invalid_settings_never_reach_the_server() {
    let org = unique_org_id();
    let flaky = Arc::new(FlakyRpc::new(seeded_store(&org, 0.3)));
    let service = service_over(flaky.clone(), &org, &ClientConfig::default());

    let err = service
        .save_project_config(&org, &project_id("p"), router_settings(1.5))
        .await
        .unwrap_err();

    assert!(err.is_client_side());
    assert_eq!(flaky.calls(Verb::Create), 0);
    assert!(
        !service
            .cache()
            .contains(&CacheKey::project_config(&org, &project_id("p")))
    );
}

#[tokio::test]
async fn test_concurrent_admins_conflict_on_stale_view() {
    let org = unique_org_id();
    let store = seeded_store(&org, 0.3);
    let first = service_over(store.clone(), &org, &ClientConfig::default());
    let second = service_over(store.clone(), &org, &ClientConfig::default());
    first
        .save_project_config(&org, &project_id("p"), router_settings(0.8))
        .await
        .unwrap();

    let seen_by_second = second
        .get_effective_config(&org, &project_id("p"))
        .await
        .unwrap();
    first
        .save_project_config(&org, &project_id("p"), router_settings(0.7))
        .await
        .unwrap();

    let err = second
        .save_project_config_from(&seen_by_second, &org, &project_id("p"), router_settings(0.2))
        .await
        .unwrap_err();

    assert!(matches!(err, MutationError::Conflict { .. }));
    let stored = store.project_config(&org, &project_id("p")).unwrap();
    assert_eq!(
        stored.settings.model_router_config.map(|r| r.cost_bias),
        Some(0.7)
    );
}

#[tokio::test]
async fn test_superseded_read_does_not_overwrite_committed_write() {
    let org = unique_org_id();
    let gated = Arc::new(GatedRpc::new(seeded_store(&org, 0.3)));
    let config = ClientConfig {
        cache: CacheSettings {
            refetch_on_invalidate: false,
            ..CacheSettings::default()
        },
        ..ClientConfig::default()
    };
    let service = service_over(gated.clone(), &org, &config);
    let org_key = CacheKey::organization_config(&org);
    service.organization_config(&org).await.unwrap();

    gated.close();
    let cache = service.cache().clone();
    let key = org_key.clone();
    let in_flight = tokio::spawn(async move { cache.refetch(&key).await });
    gated.wait_for_parked(1).await;

    service
        .save_organization_config(&org, router_settings(0.9))
        .await
        .unwrap();
    gated.open();
    in_flight.await.unwrap().unwrap();

    let cached = service.cache().data(&org_key).unwrap();
    assert_eq!(cached["modelRouterConfig"]["costBias"], 0.9);
}

#[tokio::test]
async fn test_save_all_keeps_every_form_when_one_fails() {
    let org = unique_org_id();
    let flaky = Arc::new(FlakyRpc::new(seeded_store(&org, 0.3)));
    let service = Arc::new(service_over(flaky.clone(), &org, &ClientConfig::default()));

    for project in ["a", "b", "c"] {
        let form = ProjectConfigForm::open(service.clone(), org.clone(), project_id(project))
            .await
            .unwrap();
        form.edit(|settings| set_cost_bias(settings, 0.9));
        assert!(form.sync(service.registry()));
    }
    flaky.fail_next(Verb::Create, 1, MutationError::transport("timeout"));

    let err = service.registry().save_all().await.unwrap_err();

    assert!(matches!(err, FormError::SaveFailed { .. }));
    assert_eq!(service.registry().dirty_count(), 3);
    assert_eq!(flaky.calls(Verb::Create), 3);
}

#[tokio::test]
async fn test_save_all_clears_registry_on_success() {
    let org = unique_org_id();
    let service = Arc::new(service_over(
        seeded_store(&org, 0.3),
        &org,
        &ClientConfig::default(),
    ));
    let form = ProjectConfigForm::open(service.clone(), org.clone(), project_id("p"))
        .await
        .unwrap();
    form.edit(|settings| set_cost_bias(settings, 0.6));
    form.sync(service.registry());

    assert_eq!(service.registry().save_all().await.unwrap(), 1);
    assert!(!service.registry().has_dirty_forms());
    assert!(!form.is_dirty());
    assert!(!form.sync(service.registry()));
    assert_eq!(form.displayed().source, ConfigSource::Project);
    let effective = service
        .get_effective_config(&org, &project_id("p"))
        .await
        .unwrap();
    assert_eq!(effective.cost_bias(), Some(0.6));
}

#[tokio::test]
async fn test_save_all_retry_succeeds_after_partial_failure() {
    let org = unique_org_id();
    let flaky = Arc::new(FlakyRpc::new(seeded_store(&org, 0.3)));
    let service = Arc::new(service_over(flaky.clone(), &org, &ClientConfig::default()));

    let mut forms = Vec::new();
    for project in ["a", "b", "c"] {
        let form = ProjectConfigForm::open(service.clone(), org.clone(), project_id(project))
            .await
            .unwrap();
        form.edit(|settings| set_cost_bias(settings, 0.9));
        form.sync(service.registry());
        forms.push(form);
    }
    flaky.fail_next(Verb::Create, 1, MutationError::transport("timeout"));
    service.registry().save_all().await.unwrap_err();
    assert_eq!(service.registry().dirty_count(), 3);

    // The two forms that committed retry as updates, the failed one as a create.
    assert_eq!(service.registry().save_all().await.unwrap(), 3);

    assert!(!service.registry().has_dirty_forms());
    assert_eq!(flaky.calls(Verb::Create), 4);
    assert_eq!(flaky.calls(Verb::Update), 2);
    for form in &forms {
        assert!(!form.is_dirty());
        assert_eq!(form.displayed().source, ConfigSource::Project);
    }
    for project in ["a", "b", "c"] {
        let effective = service
            .get_effective_config(&org, &project_id(project))
            .await
            .unwrap();
        assert_eq!(effective.source, ConfigSource::Project);
        assert_eq!(effective.cost_bias(), Some(0.9));
    }
}

#[tokio::test]
async fn test_saving_a_form_twice_updates_against_the_committed_row() {
    let org = unique_org_id();
    let flaky = Arc::new(FlakyRpc::new(seeded_store(&org, 0.3)));
    let service = Arc::new(service_over(flaky.clone(), &org, &ClientConfig::default()));
    let form = ProjectConfigForm::open(service.clone(), org.clone(), project_id("p"))
        .await
        .unwrap();

    form.edit(|settings| set_cost_bias(settings, 0.7));
    form.save().await.unwrap();
    form.edit(|settings| set_cost_bias(settings, 0.4));
    let row = form.save().await.unwrap();

    assert_eq!(flaky.calls(Verb::Create), 1);
    assert_eq!(flaky.calls(Verb::Update), 1);
    assert_eq!(form.displayed().updated_at, Some(row.updated_at));
    assert!(!form.is_dirty());
}

#[tokio::test]
async fn test_history_merges_config_and_provider_events_newest_first() {
    let org = unique_org_id();
    let service = service_over(seeded_store(&org, 0.3), &org, &ClientConfig::default());
    service
        .save_project_config(&org, &project_id("p"), router_settings(0.8))
        .await
        .unwrap();
    service
        .create_provider(
            &org,
            NewProvider {
                provider: "anthropic".to_string(),
                display_name: "Anthropic".to_string(),
                base_url: None,
                priority: 1,
                enabled: true,
            },
        )
        .await
        .unwrap();

    let history = service.history(&org).await.unwrap();

    let entity_types: Vec<&str> = history.iter().map(|e| e.entity_type.as_str()).collect();
    assert_eq!(
        entity_types,
        vec!["provider_connection", "project_config", "organization_config"]
    );
    assert!(history.iter().all(|e| e.action == "create"));
    assert!(history.windows(2).all(|w| w[0].changed_at >= w[1].changed_at));
    assert_eq!(history[1].changed_by, "alice");
}

#[tokio::test]
async fn test_provider_lifecycle() {
    let org = unique_org_id();
    let service = service_over(
        Arc::new(InMemoryConfigStore::new()),
        &org,
        &ClientConfig::default(),
    );
    let created = service
        .create_provider(
            &org,
            NewProvider {
                provider: "openai".to_string(),
                display_name: "OpenAI".to_string(),
                base_url: Some("https://api.openai.com".to_string()),
                priority: 2,
                enabled: true,
            },
        )
        .await
        .unwrap();

    let mut renamed = created.clone();
    renamed.display_name = "OpenAI (prod)".to_string();
    let updated = service.update_provider(renamed).await.unwrap();
    assert_eq!(updated.display_name, "OpenAI (prod)");

    service.delete_provider(&org, &created.id).await.unwrap();
    assert!(service.providers(&org).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_update_of_provider_deleted_elsewhere_rolls_back() {
    let org = unique_org_id();
    let store = seeded_store(&org, 0.3);
    let service = service_over(store.clone(), &org, &ClientConfig::default());
    let created = service
        .create_provider(
            &org,
            NewProvider {
                provider: "openai".to_string(),
                display_name: "OpenAI".to_string(),
                base_url: None,
                priority: 1,
                enabled: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(service.providers(&org).await.unwrap().len(), 1);

    let list_key = CacheKey::providers(&org);
    let list_before = service.cache().data(&list_key);
    store
        .delete_provider(&org, &created.id, &user_id("bob"))
        .unwrap();

    let mut renamed = created.clone();
    renamed.display_name = "OpenAI (prod)".to_string();
    let err = service.update_provider(renamed).await.unwrap_err();

    assert!(matches!(err, MutationError::NotFound { .. }));
    assert_eq!(service.cache().data(&list_key), list_before);
}

#[test]
fn test_rollback_is_recorded_in_metrics() {
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let org = unique_org_id();
            let flaky = Arc::new(FlakyRpc::new(seeded_store(&org, 0.3)));
            let service = service_over(flaky.clone(), &org, &ClientConfig::default());
            flaky.fail_next(Verb::Create, 1, MutationError::transport("down"));

            let result = service
                .save_project_config(&org, &project_id("p"), router_settings(0.8))
                .await;
            assert!(result.is_err());
        });
    });

    let snapshot = snapshotter.snapshot().into_vec();
    let rollbacks = snapshot.iter().find_map(|(key, _, _, value)| {
        (key.key().name() == "rc_mutation_rollbacks_total").then_some(value)
    });
    assert_eq!(rollbacks, Some(&DebugValue::Counter(1)));
}
