//! Editable config forms backed by [`ConfigService`] saves.
//!
//! A form holds a draft of [`RoutingSettings`] next to its baseline: what
//! was displayed when editing began, replaced by the committed row after
//! every successful save. `sync` keeps the form's registry membership in
//! step with whether the draft differs; the registered [`DirtyForm`] saves
//! the draft through the service and its reset restores the baseline.
//!
//! Clones share draft and baseline, so a form left registered after a
//! failed batch retries against what the server already accepted.

use std::sync::Arc;

use errors::MutationError;
use forms::{DirtyForm, DirtyFormRegistry};
use parking_lot::Mutex;
use rc_core::{
    EffectiveConfig, OrganizationConfig, OrganizationId, ProjectConfig, ProjectId, RoutingSettings,
};

use crate::service::ConfigService;

#[derive(Clone)]
pub struct ProjectConfigForm {
    service: Arc<ConfigService>,
    organization_id: OrganizationId,
    project_id: ProjectId,
    displayed: Arc<Mutex<EffectiveConfig>>,
    draft: Arc<Mutex<RoutingSettings>>,
}

impl ProjectConfigForm {
    pub fn new(
        service: Arc<ConfigService>,
        organization_id: OrganizationId,
        project_id: ProjectId,
        displayed: EffectiveConfig,
    ) -> Self {
        let draft = Arc::new(Mutex::new(displayed.settings.clone()));
        Self {
            service,
            organization_id,
            project_id,
            displayed: Arc::new(Mutex::new(displayed)),
            draft,
        }
    }

    /// Open a form on whatever the service currently shows for the project.
    pub async fn open(
        service: Arc<ConfigService>,
        organization_id: OrganizationId,
        project_id: ProjectId,
    ) -> Result<Self, MutationError> {
        let displayed = service
            .get_effective_config(&organization_id, &project_id)
            .await?;
        Ok(Self::new(service, organization_id, project_id, displayed))
    }

    pub fn id(&self) -> String {
        format!("project-config:{}:{}", self.organization_id, self.project_id)
    }

    pub fn displayed(&self) -> EffectiveConfig {
        self.displayed.lock().clone()
    }

    pub fn draft(&self) -> RoutingSettings {
        self.draft.lock().clone()
    }

    pub fn edit(&self, change: impl FnOnce(&mut RoutingSettings)) {
        change(&mut *self.draft.lock());
    }

    pub fn is_dirty(&self) -> bool {
        *self.draft.lock() != self.displayed.lock().settings
    }

    /// Save the draft against the current baseline and adopt the committed
    /// row as the new baseline.
    pub async fn save(&self) -> Result<ProjectConfig, MutationError> {
        let displayed = self.displayed();
        let row = self
            .service
            .save_project_config_from(
                &displayed,
                &self.organization_id,
                &self.project_id,
                self.draft(),
            )
            .await?;
        *self.displayed.lock() = resolver::resolve(None, Some(&row));
        Ok(row)
    }

    pub fn dirty_form(&self) -> DirtyForm {
        let save = self.clone();
        let reset = self.clone();
        DirtyForm::new(
            self.id(),
            format!("Project {} configuration", self.project_id),
            move || {
                let form = save.clone();
                async move { form.save().await.map(|_| ()) }
            },
            move || {
                let baseline = reset.displayed.lock().settings.clone();
                *reset.draft.lock() = baseline;
                Ok(())
            },
        )
    }

    /// Register with `registry` while dirty, unregister once clean.
    /// Returns whether the form is now registered.
    pub fn sync(&self, registry: &DirtyFormRegistry) -> bool {
        if self.is_dirty() {
            registry.register_form(self.dirty_form());
            true
        } else {
            registry.unregister_form(&self.id());
            false
        }
    }
}

#[derive(Clone)]
pub struct OrganizationConfigForm {
    service: Arc<ConfigService>,
    organization_id: OrganizationId,
    current: Arc<Mutex<Option<OrganizationConfig>>>,
    draft: Arc<Mutex<RoutingSettings>>,
}

impl OrganizationConfigForm {
    /// Without an existing row the draft starts from the system default.
    pub fn new(
        service: Arc<ConfigService>,
        organization_id: OrganizationId,
        current: Option<OrganizationConfig>,
    ) -> Self {
        let initial = current
            .as_ref()
            .map_or_else(resolver::default_settings, |row| row.settings.clone());
        Self {
            service,
            organization_id,
            current: Arc::new(Mutex::new(current)),
            draft: Arc::new(Mutex::new(initial)),
        }
    }

    pub async fn open(
        service: Arc<ConfigService>,
        organization_id: OrganizationId,
    ) -> Result<Self, MutationError> {
        let current = service.organization_config(&organization_id).await?;
        Ok(Self::new(service, organization_id, current))
    }

    pub fn id(&self) -> String {
        format!("organization-config:{}", self.organization_id)
    }

    pub fn draft(&self) -> RoutingSettings {
        self.draft.lock().clone()
    }

    pub fn edit(&self, change: impl FnOnce(&mut RoutingSettings)) {
        change(&mut *self.draft.lock());
    }

    pub fn current(&self) -> Option<OrganizationConfig> {
        self.current.lock().clone()
    }

    fn baseline(&self) -> RoutingSettings {
        self.current
            .lock()
            .as_ref()
            .map_or_else(resolver::default_settings, |row| row.settings.clone())
    }

    /// A form over a missing row is dirty from the start: saving it creates
    /// the row.
    pub fn is_dirty(&self) -> bool {
        let Some(baseline) = self.current().map(|row| row.settings) else {
            return true;
        };
        *self.draft.lock() != baseline
    }

    pub async fn save(&self) -> Result<OrganizationConfig, MutationError> {
        let current = self.current();
        let row = self
            .service
            .save_organization_config_from(current.as_ref(), &self.organization_id, self.draft())
            .await?;
        *self.current.lock() = Some(row.clone());
        Ok(row)
    }

    pub fn dirty_form(&self) -> DirtyForm {
        let save = self.clone();
        let reset = self.clone();
        DirtyForm::new(
            self.id(),
            "Organization configuration",
            move || {
                let form = save.clone();
                async move { form.save().await.map(|_| ()) }
            },
            move || {
                let baseline = reset.baseline();
                *reset.draft.lock() = baseline;
                Ok(())
            },
        )
    }

    pub fn sync(&self, registry: &DirtyFormRegistry) -> bool {
        if self.is_dirty() {
            registry.register_form(self.dirty_form());
            true
        } else {
            registry.unregister_form(&self.id());
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::ClientConfig;
    use testing::{StaticIdentity, org_id, project_id, seeded_store};

    fn service(organization_id: &OrganizationId) -> Arc<ConfigService> {
        Arc::new(ConfigService::new(
            seeded_store(organization_id, 0.3),
            Arc::new(StaticIdentity::new("alice", organization_id)),
            &ClientConfig::default(),
        ))
    }

    fn set_cost_bias(settings: &mut RoutingSettings, cost_bias: f64) {
        if let Some(router) = settings.model_router_config.as_mut() {
            router.cost_bias = cost_bias;
        }
    }

    #[tokio::test]
    async fn test_sync_tracks_dirtiness() {
        let org = org_id("org-x");
        let service = service(&org);
        let form = ProjectConfigForm::open(service.clone(), org.clone(), project_id("p"))
            .await
            .unwrap();
        let registry = service.registry();

        assert!(!form.sync(registry));
        form.edit(|settings| set_cost_bias(settings, 0.8));
        assert!(form.sync(registry));
        assert_eq!(registry.dirty_count(), 1);

        form.edit(|settings| set_cost_bias(settings, 0.3));
        assert!(!form.sync(registry));
        assert!(!registry.has_dirty_forms());
    }

    #[tokio::test]
    async fn test_reset_restores_displayed_settings() {
        let org = org_id("org-x");
        let service = service(&org);
        let form = ProjectConfigForm::open(service.clone(), org.clone(), project_id("p"))
            .await
            .unwrap();
        form.edit(|settings| set_cost_bias(settings, 0.9));
        form.sync(service.registry());

        let outcome = service.registry().reset_all();

        assert_eq!(outcome.reset, 1);
        assert!(!form.is_dirty());
    }

    #[tokio::test]
    async fn test_organization_form_without_row_starts_dirty_and_creates() {
        let org = org_id("org-empty");
        let service = Arc::new(ConfigService::new(
            Arc::new(storage::InMemoryConfigStore::new()),
            Arc::new(StaticIdentity::new("alice", &org)),
            &ClientConfig::default(),
        ));
        let form = OrganizationConfigForm::open(service.clone(), org.clone())
            .await
            .unwrap();

        assert!(form.sync(service.registry()));
        assert_eq!(service.registry().save_all().await.unwrap(), 1);

        let row = service.organization_config(&org).await.unwrap().unwrap();
        assert_eq!(row.settings, resolver::default_settings());
        assert_eq!(form.current(), Some(row));
        assert!(!form.is_dirty());
    }

    #[tokio::test]
    async fn test_organization_form_updates_after_first_save() {
        let org = org_id("org-x");
        let service = service(&org);
        let form = OrganizationConfigForm::open(service.clone(), org.clone())
            .await
            .unwrap();

        form.edit(|settings| set_cost_bias(settings, 0.6));
        let first = form.save().await.unwrap();
        form.edit(|settings| set_cost_bias(settings, 0.2));
        let second = form.save().await.unwrap();

        assert_eq!(second.id, first.id);
        assert!(second.updated_at > first.updated_at);
        assert_eq!(
            second.settings.model_router_config.map(|r| r.cost_bias),
            Some(0.2)
        );
        assert!(!form.is_dirty());
    }
}
