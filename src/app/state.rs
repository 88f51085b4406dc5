use super::{ComponentState, SentryOrchestrator};
use std::collections::BTreeMap;
use tracing::debug;

impl SentryOrchestrator {
    pub(super) async fn set_component_state(&self, component: &str, state: ComponentState) {
        let previous = self
            .component_states
            .lock()
            .await
            .insert(component.to_string(), state.clone());
        if previous.as_ref() != Some(&state) {
            debug!("{}: {:?} -> {:?}", component, previous, state);
        }
    }

    pub async fn component_state(&self, component: &str) -> Option<ComponentState> {
        self.component_states.lock().await.get(component).cloned()
    }

    /// Snapshot of every registered component, ordered by name
    pub async fn component_states(&self) -> BTreeMap<String, ComponentState> {
        self.component_states
            .lock()
            .await
            .iter()
            .map(|(name, state)| (name.clone(), state.clone()))
            .collect()
    }
}
