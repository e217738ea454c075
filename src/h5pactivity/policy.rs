// Package state policies
//
// Pure decisions taken from the observed file state: what the page shows and
// whether the package plays, downloads or waits for the user.

use crate::filepool::FileState;

/// Message explaining why the package must be downloaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateMessage {
    Outdated,
    NotDownloaded,
}

impl StateMessage {
    pub fn key(&self) -> &'static str {
        match self {
            StateMessage::Outdated => "addon.mod_h5pactivity.filestateoutdated",
            StateMessage::NotDownloaded => "addon.mod_h5pactivity.filestatenotdownloaded",
        }
    }
}

/// What the page shows for a file state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatePosture {
    /// Show the message and offer the download
    NeedsDownload(StateMessage),
    /// Someone is downloading the file, follow that download
    Downloading,
    /// Local copy is current
    Ready,
}

impl FileStatePosture {
    pub fn for_state(state: FileState) -> Self {
        match state {
            FileState::Outdated => FileStatePosture::NeedsDownload(StateMessage::Outdated),
            FileState::NotDownloaded => FileStatePosture::NeedsDownload(StateMessage::NotDownloaded),
            FileState::Downloading => FileStatePosture::Downloading,
            FileState::Downloaded => FileStatePosture::Ready,
        }
    }

    pub fn state_message(&self) -> Option<StateMessage> {
        match self {
            FileStatePosture::NeedsDownload(message) => Some(*message),
            _ => None,
        }
    }

    pub fn needs_download(&self) -> bool {
        matches!(self, FileStatePosture::NeedsDownload(_))
    }
}

/// Inputs of the play/download decision taken after fetching the content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionInput {
    /// Site and app allow storing the package
    pub downloads_enabled: bool,
    pub state: Option<FileState>,
    pub online: bool,
    /// Declared size is known and below the auto-download threshold
    pub below_threshold: bool,
}

/// Next step once the content is loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentAction {
    Play,
    AutoDownload,
    AwaitUser,
}

pub fn decide_content_action(input: DecisionInput) -> ContentAction {
    if !input.downloads_enabled || input.state == Some(FileState::Downloaded) {
        return ContentAction::Play;
    }

    let stale = input.state.is_some_and(FileState::needs_download);
    if stale && input.online && input.below_threshold {
        ContentAction::AutoDownload
    } else {
        ContentAction::AwaitUser
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eligible() -> DecisionInput {
        DecisionInput {
            downloads_enabled: true,
            state: Some(FileState::NotDownloaded),
            online: true,
            below_threshold: true,
        }
    }

    #[test]
    fn test_posture_table() {
        let table = [
            (FileState::Outdated, Some(StateMessage::Outdated), true),
            (FileState::NotDownloaded, Some(StateMessage::NotDownloaded), true),
            (FileState::Downloading, None, false),
            (FileState::Downloaded, None, false),
        ];

        for (state, message, needs_download) in table {
            let posture = FileStatePosture::for_state(state);
            assert_eq!(posture.state_message(), message, "{}", state);
            assert_eq!(posture.needs_download(), needs_download, "{}", state);
        }

        assert_eq!(FileStatePosture::for_state(FileState::Downloading), FileStatePosture::Downloading);
    }

    #[test]
    fn test_auto_download_when_all_conditions_hold() {
        assert_eq!(decide_content_action(eligible()), ContentAction::AutoDownload);

        let outdated = DecisionInput { state: Some(FileState::Outdated), ..eligible() };
        assert_eq!(decide_content_action(outdated), ContentAction::AutoDownload);
    }

    #[test]
    fn test_each_condition_gates_auto_download() {
        let disabled = DecisionInput { downloads_enabled: false, ..eligible() };
        assert_eq!(decide_content_action(disabled), ContentAction::Play);

        let downloading = DecisionInput { state: Some(FileState::Downloading), ..eligible() };
        assert_eq!(decide_content_action(downloading), ContentAction::AwaitUser);

        let offline = DecisionInput { online: false, ..eligible() };
        assert_eq!(decide_content_action(offline), ContentAction::AwaitUser);

        let large = DecisionInput { below_threshold: false, ..eligible() };
        assert_eq!(decide_content_action(large), ContentAction::AwaitUser);
    }

    #[test]
    fn test_downloaded_plays() {
        let downloaded = DecisionInput { state: Some(FileState::Downloaded), online: false, ..eligible() };
        assert_eq!(decide_content_action(downloaded), ContentAction::Play);
    }

    #[test]
    fn test_unknown_state_waits() {
        let unknown = DecisionInput { state: None, ..eligible() };
        assert_eq!(decide_content_action(unknown), ContentAction::AwaitUser);
    }
}
