//! Built-in tools for reading and writing survey answers.

mod field_state;

pub use field_state::{
    READ_FIELD_STATE, ReadFieldStateTool, UPDATE_FIELD_VALUE, UpdateFieldValueTool,
};

use std::sync::Arc;

use super::ToolRegistry;

/// Register the field-state tools the collaborator needs.
pub fn register_survey_tools(registry: &ToolRegistry) {
    registry.register_sync(Arc::new(ReadFieldStateTool));
    registry.register_sync(Arc::new(UpdateFieldValueTool));
}
