pub mod desktop;

use std::path::PathBuf;

use async_trait::async_trait;

/// What a `system_open` action asks the desktop to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenTarget {
    Browser(Option<String>),
    Calculator,
    TextEditor,
    Path(PathBuf),
}

impl OpenTarget {
    pub fn describe(&self) -> String {
        match self {
            OpenTarget::Browser(Some(url)) => format!("{url} in browser"),
            OpenTarget::Browser(None) => "browser".to_string(),
            OpenTarget::Calculator => "calculator".to_string(),
            OpenTarget::TextEditor => "text editor".to_string(),
            OpenTarget::Path(path) => path.display().to_string(),
        }
    }
}

/// OS side effects the executor may request. Implementations perform the
/// actual platform call.
#[async_trait]
pub trait SystemBridge: Send + Sync {
    async fn open(&self, target: &OpenTarget) -> anyhow::Result<()>;
    async fn notify(&self, title: &str, message: &str) -> anyhow::Result<()>;
}
