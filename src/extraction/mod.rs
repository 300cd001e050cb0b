mod parser;
mod segmenter;

pub use parser::{
    extract_tasks_from_model_output, parse_task_markdown, ParsedTask, CARRIER_BRANDS,
    NO_TASK_SENTINEL,
};
pub use segmenter::format_multi_message_input;

/// Strip exactly one layer of surrounding double quotes, if both are present.
pub(crate) fn strip_surrounding_quotes(text: &str) -> &str {
    text.strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(text)
}
