//! Device limit evaluation
//!
//! A pure function of the attached count and the limit/blocking hints from
//! configuration and from the service. Local configuration always wins over
//! the server hint.

/// Everything the policy looks at
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LimitInputs {
    pub attached_count: u32,
    pub configured_overall_limit: Option<u32>,
    pub server_default_limit: Option<u32>,
    pub server_block_flag: Option<bool>,
    pub appearance_block_flag: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitDecision {
    /// `None` when neither configuration nor the service gave a limit
    pub effective_limit: Option<u32>,
    pub exceeded: bool,
    pub should_block: bool,
}

impl LimitDecision {
    /// Policy with no limit: never exceeded, never blocks
    pub const INERT: LimitDecision = LimitDecision {
        effective_limit: None,
        exceeded: false,
        should_block: false,
    };
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LimitPolicy;

impl LimitPolicy {
    pub fn effective_limit(configured: Option<u32>, server_default: Option<u32>) -> Option<u32> {
        configured.or(server_default)
    }

    /// Whether `count` fits under `limit`. No limit means nothing to enforce.
    pub fn within_limit(count: u32, limit: Option<u32>) -> bool {
        limit.map_or(true, |limit| count <= limit)
    }

    pub fn evaluate(inputs: &LimitInputs) -> LimitDecision {
        let Some(limit) =
            Self::effective_limit(inputs.configured_overall_limit, inputs.server_default_limit)
        else {
            return LimitDecision::INERT;
        };

        let exceeded = inputs.attached_count > limit;
        let block_flag = inputs
            .appearance_block_flag
            .or(inputs.server_block_flag)
            .unwrap_or(false);

        LimitDecision {
            effective_limit: Some(limit),
            exceeded,
            should_block: exceeded && block_flag,
        }
    }
}
