//! Prompt templates for the workflow agents. Rendered with handlebars;
//! triple-stache placeholders carry user text that must not be HTML-escaped.

pub(crate) const SEARCH_TASK_TEMPLATE: &str = r#"Find the reviews and businesses relevant to this user question:
{{{user_query}}}

Use search_reviews for customer opinions and search_businesses for business records. Use get_business_info when you need the full record for a specific business id. Gather enough material for a later analysis step, then return your structured answer with every tool output you collected."#;

pub(crate) const ANALYSIS_TASK_TEMPLATE: &str = r#"Analyze the material already collected for this user question:
{{{user_query}}}

Collected so far:
- business ids: {{{business_ids}}}
- review count: {{review_count}}
- review fields: {{{review_fields}}}

Call analyze_sentiment to compute sentiment metrics over the collected reviews (an empty input analyzes all of them). Then return your structured answer with the sentiment output you obtained."#;

pub(crate) const RESPONSE_PROMPT_TEMPLATE: &str = r#"You are a business intelligence assistant. Answer the user's question using only the findings below.

User question:
{{{user_query}}}

Findings:
{{{context}}}

Write a clear, well-organized answer. Mention concrete businesses, ratings and sentiment figures where the findings support them. Do not invent data that is not in the findings."#;

pub(crate) const SUPERVISOR_DECISION_TEMPLATE: &str = r#"You are the supervisor of a multi-agent workflow answering this user question:
{{{user_query}}}

Workers:
- SearchAgent: retrieves relevant reviews and businesses.
- AnalysisAgent: computes sentiment and statistics over what SearchAgent found.
- ResponseAgent: writes the final answer from the collected findings.

Progress so far (last agent to run: {{{last_agent}}}):
{{{search_status}}}
{{{analysis_status}}}
{{{response_status}}}

Routing rules:
- Run SearchAgent first when nothing has been collected yet.
- Run AnalysisAgent once search results exist and no analysis has been done.
- Run ResponseAgent once the findings are ready, or again if the final response is missing or inadequate.
- Choose FINISH only when a final response exists.

Respond with ONLY one of: SearchAgent, AnalysisAgent, ResponseAgent, FINISH."#;
