pub mod fact;
pub mod judgment_audit;
pub mod memory;
