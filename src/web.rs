//! Web management console collaborator contract.
//!
//! The browser-automation layer that drives the appliance's upload/delete
//! UI lives outside this crate. The orchestrator consumes it through the
//! [`WebConsole`] trait; implementations wrap whatever drives the browser.
//! Upload confirmation dialogs are resolved by keyword: accept when the
//! dialog text contains any configured success keyword, else dismiss.

use std::future::Future;
use std::path::Path;

pub use crate::error::WebError;

/// Handle to the appliance's web management interface.
pub trait WebConsole: Send {
    /// Log in and open a management session.
    fn open_session(&mut self) -> impl Future<Output = Result<(), WebError>> + Send;

    /// Upload a firmware image through the version-management page.
    ///
    /// The implementation resolves the confirmation dialog itself (see
    /// [`dialog_accepted`]).
    fn upload(&mut self, file_path: &Path) -> impl Future<Output = Result<(), WebError>> + Send;

    /// Delete an uploaded image, optionally designating the rollback
    /// image as the next-boot file.
    fn delete(
        &mut self,
        file_name: &str,
        next_boot_file: Option<&str>,
    ) -> impl Future<Output = Result<(), WebError>> + Send;

    /// Tear the session down. Best-effort, never fails.
    fn close_session(&mut self) -> impl Future<Output = ()> + Send;
}

/// Decide whether a confirmation dialog should be accepted.
///
/// Keyword matching is substring-based, so localized dialog texts work as
/// long as one configured keyword appears in them.
pub fn dialog_accepted(dialog_text: &str, success_keywords: &[String]) -> bool {
    success_keywords.iter().any(|kw| dialog_text.contains(kw))
}
