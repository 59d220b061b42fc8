use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::schema::{FileSlot, SlotId};

/// How reference documents are chosen for a validation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReferencePolicy {
    /// Every completed reference slot is sent, in slot order.
    #[default]
    AllCompleted,
    /// Exactly one reference slot, chosen by the caller, is sent.
    SingleSelected,
}

/// Remote paths a validation run should be started with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationTargets {
    pub input_path: String,
    pub reference_paths: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    NoInput,
    InputNotReady,
    NoCompletedReference,
    NoReferenceSelected,
    SelectedReferenceNotReady,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BlockReason::NoInput => "no input document has been chosen",
            BlockReason::InputNotReady => "the input document has not finished uploading",
            BlockReason::NoCompletedReference => "no reference document has finished uploading",
            BlockReason::NoReferenceSelected => "no reference document is selected",
            BlockReason::SelectedReferenceNotReady => {
                "the selected reference document has not finished uploading"
            }
        };
        f.write_str(text)
    }
}

/// Whether a validation run may start right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Ready(ValidationTargets),
    Blocked(BlockReason),
}

impl Eligibility {
    pub fn is_ready(&self) -> bool {
        matches!(self, Eligibility::Ready(_))
    }

    pub fn targets(&self) -> Option<&ValidationTargets> {
        match self {
            Eligibility::Ready(targets) => Some(targets),
            Eligibility::Blocked(_) => None,
        }
    }
}

pub(crate) fn evaluate(
    policy: ReferencePolicy,
    input: Option<&FileSlot>,
    references: &[FileSlot],
    selected: Option<&SlotId>,
) -> Eligibility {
    let Some(input) = input else {
        return Eligibility::Blocked(BlockReason::NoInput);
    };
    let input_path = match (&input.remote_path, input.is_completed()) {
        (Some(path), true) => path.clone(),
        _ => return Eligibility::Blocked(BlockReason::InputNotReady),
    };

    let reference_paths: Vec<String> = match policy {
        ReferencePolicy::AllCompleted => references
            .iter()
            .filter(|slot| slot.is_completed())
            .filter_map(|slot| slot.remote_path.clone())
            .collect(),
        ReferencePolicy::SingleSelected => {
            let Some(selected) = selected else {
                return Eligibility::Blocked(BlockReason::NoReferenceSelected);
            };
            match references.iter().find(|slot| &slot.id == selected) {
                None => return Eligibility::Blocked(BlockReason::NoReferenceSelected),
                Some(slot) if !slot.is_completed() => {
                    return Eligibility::Blocked(BlockReason::SelectedReferenceNotReady)
                }
                Some(slot) => slot.remote_path.iter().cloned().collect(),
            }
        }
    };

    if reference_paths.is_empty() {
        return Eligibility::Blocked(BlockReason::NoCompletedReference);
    }

    Eligibility::Ready(ValidationTargets {
        input_path,
        reference_paths,
    })
}
