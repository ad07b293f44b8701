//! Prompt text and response schemas for the search pipeline

use crate::conductor::types::{ChatMessage, MAX_PLAN_STEPS};
use crate::llm::{Message, ResponseSchema};
use serde_json::json;

/// Maximum number of search queries derived for one step
pub const MAX_SEARCH_QUERIES: usize = 3;

const PLAN_PROMPT: &str = "You break a question down into simple search steps that can each be \
answered with a web search engine.

Rules:
1. Use at most 4 steps, fewer when possible.
2. Keep each step short and self-contained.
3. Give each step an integer \"id\" starting at 0, a \"step\" description, and \"dependencies\": \
the ids of earlier steps whose findings it needs.
4. The first step always has an empty dependencies list. A step may only depend on steps with a \
smaller id.

Example question: \"Compare Perplexity and You.com in terms of revenue, number of employees, and valuation\"
Example plan:
{\"steps\": [
  {\"id\": 0, \"step\": \"Research Perplexity's revenue, employee count, and valuation\", \"dependencies\": []},
  {\"id\": 1, \"step\": \"Research You.com's revenue, employee count, and valuation\", \"dependencies\": []},
  {\"id\": 2, \"step\": \"Compare revenue, employees, and valuation of Perplexity and You.com\", \"dependencies\": [0, 1]}
]}";

const SEARCH_QUERY_PROMPT: &str = "Write web search queries that gather the information needed \
for the current step of a research plan. Use the fewest queries that cover the step, and never \
more than 3. Fold in concrete facts from the context of previous steps so the queries build on \
what is already known.";

const ANSWER_PROMPT: &str = "Answer the question using only the numbered search results below. \
Write in an unbiased, journalistic tone and match the language of the question.

Cite every sentence inline with the number of the result it comes from, like [1], placing \
citations at the end of the sentence. Several citations are written back to back: [1][3]. \
Only cite results that actually support the sentence. If results describe different entities \
with the same name, answer for each separately.

Format the answer as markdown with a title and sections, end it with a references section \
listing the cited sources, and do not repeat the question.";

const REWRITE_PROMPT: &str = "Given a conversation and a follow-up input, rephrase the follow-up \
into a SHORT standalone search query that carries any context it needs from the conversation. \
If the topic clearly changed, ignore the conversation. Drop anything irrelevant for retrieval \
and match the language of the follow-up. Respond with only the query.";

/// Messages asking for a standalone rewrite of `query`
pub fn rewrite_messages(transcript: &[ChatMessage], query: &str) -> Vec<Message> {
    let history = transcript
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str(), m.content))
        .collect::<Vec<_>>()
        .join("\n");

    vec![
        Message::system(REWRITE_PROMPT),
        Message::user(format!(
            "Conversation:\n{}\n\nFollow-up input: {}\nStandalone query:",
            history, query
        )),
    ]
}

pub fn plan_messages(query: &str) -> Vec<Message> {
    vec![
        Message::system(PLAN_PROMPT),
        Message::user(format!("Question: {}\nPlan:", query)),
    ]
}

pub fn plan_schema() -> ResponseSchema {
    ResponseSchema::new(
        "query_plan",
        json!({
            "type": "object",
            "properties": {
                "steps": {
                    "type": "array",
                    "maxItems": MAX_PLAN_STEPS,
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "integer" },
                            "step": { "type": "string" },
                            "dependencies": {
                                "type": "array",
                                "items": { "type": "integer" }
                            }
                        },
                        "required": ["id", "step", "dependencies"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["steps"],
            "additionalProperties": false
        }),
    )
}

pub fn search_query_messages(
    step: &str,
    query: &str,
    context: &str,
    today: &str,
) -> Vec<Message> {
    let context = if context.is_empty() {
        "(none)"
    } else {
        context
    };

    vec![
        Message::system(format!("{}\nToday's date is {}.", SEARCH_QUERY_PROMPT, today)),
        Message::user(format!(
            "Original question: {}\n---\nContext from previous steps:\n{}\n---\nCurrent step: {}",
            query, context, step
        )),
    ]
}

pub fn search_query_schema() -> ResponseSchema {
    ResponseSchema::new(
        "search_queries",
        json!({
            "type": "object",
            "properties": {
                "search_queries": {
                    "type": "array",
                    "minItems": 1,
                    "maxItems": MAX_SEARCH_QUERIES,
                    "items": { "type": "string" }
                }
            },
            "required": ["search_queries"],
            "additionalProperties": false
        }),
    )
}

/// Messages asking for the final answer; `sources` is already numbered
pub fn answer_messages(query: &str, sources: &str) -> Vec<Message> {
    vec![
        Message::system(ANSWER_PROMPT),
        Message::user(format!(
            "<results>\n{}\n</results>\n\nQuestion: {}\nAnswer:",
            sources, query
        )),
    ]
}
