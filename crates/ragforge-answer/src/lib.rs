//! ragforge answer — context planning, extractive grounding, prompt
//! assembly, the generation driver, and evaluation scoring.

pub mod evaluate;
pub mod generate;
pub mod grounding;
pub mod planner;
pub mod prompt;

pub use evaluate::{EvalExample, EvalScore};
pub use generate::{AnswerBody, GenerationDriver};
pub use grounding::apply_grounding;
pub use planner::{estimate_tokens, plan_context};
pub use prompt::{build_prompt, merge_history, render_context, SYSTEM_PROMPT};
