//! The fixed task taxonomy and model/precision/attention menus.

use serde::{Deserialize, Serialize};

/// Model identities the extractor will load. Anything else is refused
/// before any disk or network activity happens.
pub const MODEL_ALLOWLIST: &[&str] = &[
    "microsoft/Florence-2-base",
    "microsoft/Florence-2-base-ft",
    "microsoft/Florence-2-large",
    "microsoft/Florence-2-large-ft",
    "thwri/CogFlorence-2.1-Large",
    "thwri/CogFlorence-2.2-Large",
];

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// What the task's predictions look like, which drives rasterization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskMode {
    Polygon,
    Bbox,
}

/// One of the three supported extraction tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisionTask {
    /// Polygon masks from a text prompt.
    ReferringSegmentation,
    /// Bounding boxes grounding each phrase of the prompt.
    PhraseGrounding,
    /// Class-agnostic box proposals; takes no prompt.
    RegionProposal,
}

impl VisionTask {
    /// The internal task token the model is conditioned on.
    pub fn token(self) -> &'static str {
        match self {
            Self::ReferringSegmentation => "<REFERRING_EXPRESSION_SEGMENTATION>",
            Self::PhraseGrounding => "<CAPTION_TO_PHRASE_GROUNDING>",
            Self::RegionProposal => "<REGION_PROPOSAL>",
        }
    }

    pub fn mode(self) -> TaskMode {
        match self {
            Self::ReferringSegmentation => TaskMode::Polygon,
            Self::PhraseGrounding | Self::RegionProposal => TaskMode::Bbox,
        }
    }

    pub fn allows_prompt(self) -> bool {
        !matches!(self, Self::RegionProposal)
    }

    /// Build the model prompt: the task token, followed by the user
    /// text when the task permits it. A prompt handed to a prompt-less
    /// task is dropped without comment.
    pub fn assemble_prompt(self, user_prompt: &str) -> String {
        let text = user_prompt.trim();
        if text.is_empty() || !self.allows_prompt() {
            self.token().to_string()
        } else {
            format!("{} {}", self.token(), text)
        }
    }
}

// ---------------------------------------------------------------------------
// Precision / attention menus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Fp16,
    Bf16,
    Fp32,
}

impl Precision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fp16 => "fp16",
            Self::Bf16 => "bf16",
            Self::Fp32 => "fp32",
        }
    }
}

/// Attention kernel preference passed through to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attention {
    FlashAttention2,
    Sdpa,
    Eager,
}

impl Attention {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FlashAttention2 => "flash_attention_2",
            Self::Sdpa => "sdpa",
            Self::Eager => "eager",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_assembly_appends_user_text() {
        assert_eq!(
            VisionTask::ReferringSegmentation.assemble_prompt("a red square"),
            "<REFERRING_EXPRESSION_SEGMENTATION> a red square"
        );
        assert_eq!(
            VisionTask::PhraseGrounding.assemble_prompt("  dog  "),
            "<CAPTION_TO_PHRASE_GROUNDING> dog"
        );
    }

    #[test]
    fn promptless_task_drops_user_text() {
        assert_eq!(
            VisionTask::RegionProposal.assemble_prompt("ignored"),
            "<REGION_PROPOSAL>"
        );
    }

    #[test]
    fn empty_prompt_yields_bare_token() {
        assert_eq!(
            VisionTask::ReferringSegmentation.assemble_prompt("   "),
            "<REFERRING_EXPRESSION_SEGMENTATION>"
        );
    }

    #[test]
    fn task_modes() {
        assert_eq!(VisionTask::ReferringSegmentation.mode(), TaskMode::Polygon);
        assert_eq!(VisionTask::PhraseGrounding.mode(), TaskMode::Bbox);
        assert_eq!(VisionTask::RegionProposal.mode(), TaskMode::Bbox);
    }
}
