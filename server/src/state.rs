use crate::audit::AuditNotifier;
use crate::storage::Storage;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<Storage>,
    pub audit: AuditNotifier,
    pub hmac_key: Option<Arc<Vec<u8>>>,
}
