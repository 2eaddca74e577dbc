use crate::services::pipeline::Assistant;
use crate::services::slots::SlotStore;

pub struct AppState {
    pub slots: SlotStore,
    pub assistant: Assistant,
}
