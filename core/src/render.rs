//! Presentation shell: what the panel body shows for the current state.
use crate::error::DispatchError;
use crate::options::PanelOptions;
use crate::payload::OutboundPayload;

pub const PANEL_TITLE: &str = "analytics-panel";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PanelState {
    pub last_error: Option<DispatchError>,
    pub last_payload: Option<OutboundPayload>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelAction {
    /// Re-invoke the `start` dispatch
    RetryStart,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorBlock {
    pub title: String,
    pub message: String,
    pub retryable: bool,
    pub action: PanelAction,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanelView {
    pub error: Option<ErrorBlock>,
    /// Pretty-printed payload
    pub json: Option<String>,
}

impl PanelView {
    pub fn is_empty(&self) -> bool {
        self.error.is_none() && self.json.is_none()
    }
}

/// Build the panel view. With the JSON view hidden an error is returned
/// instead, for the host's error boundary to display.
pub fn render(options: &PanelOptions, state: &PanelState) -> Result<PanelView, DispatchError> {
    if let (Some(error), false) = (&state.last_error, options.show_details()) {
        return Err(error.clone());
    }

    let error = state.last_error.as_ref().map(|e| ErrorBlock {
        title: format!("{PANEL_TITLE} error"),
        message: e.to_string(),
        retryable: e.is_retryable(),
        action: PanelAction::RetryStart,
    });

    let json = if options.show_details() {
        state
            .last_payload
            .as_ref()
            .and_then(|p| p.to_pretty_json().ok())
    } else {
        None
    };

    Ok(PanelView { error, json })
}
