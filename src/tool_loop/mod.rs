//! Bounded reason-act loop shared by the tool-using agents.
//!
//! Each step asks the model for either a tool action or a final structured
//! answer, both as fenced JSON. Tool failures become error observations the
//! model can react to; only a failed model call aborts the loop.

use std::sync::Arc;

use handlebars::Handlebars;
use serde_json::{json, Map, Value};

use crate::common_types::WorkflowError;
use crate::llm_client::{LLMRequest, LlmClient};
use crate::output_parser::{balanced_object, extract_fenced_block};
use crate::tools::Tool;

const DEFAULT_MAX_STEPS: usize = 8;

const REACT_STEP_TEMPLATE: &str = r#"You are a research assistant working on this task:
{{{task}}}

You can call the following tools:
{{#each tools}}
- {{name}}: {{{description}}}
{{/each}}

To call a tool, respond with a fenced JSON block:
```json
{"action": "<tool name>", "action_input": <arguments>}
```

When you have everything you need, respond with your final answer as a fenced JSON block:
```json
{"note": "<one-sentence summary of what you did>", "result": {"tool_outputs": {"<tool name>": [<outputs>]}, "query_processed": "<the task>", "reasoning_summary": "<how you got there>"}}
```

Steps so far:
{{{transcript}}}
"#;

/// What a finished loop hands back to its agent.
#[derive(Debug)]
pub struct LoopOutcome {
    /// The model's last answer text, expected to carry the fenced
    /// `(note, result)` block.
    pub final_text: String,
    /// Every tool output observed during the loop, keyed by tool name.
    /// Error observations are recorded like any other output.
    pub tool_outputs: Map<String, Value>,
    pub steps_used: usize,
}

pub struct ToolLoop {
    llm: Arc<LlmClient>,
    tools: Vec<Arc<dyn Tool>>,
    max_steps: usize,
    model: String,
    handlebars: Handlebars<'static>,
}

impl ToolLoop {
    pub fn new(llm: Arc<LlmClient>, tools: Vec<Arc<dyn Tool>>, model: impl Into<String>) -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        ToolLoop {
            llm,
            tools,
            max_steps: DEFAULT_MAX_STEPS,
            model: model.into(),
            handlebars,
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub async fn run(&self, task: &str) -> Result<LoopOutcome, WorkflowError> {
        let mut transcript = String::new();
        let mut tool_outputs: Map<String, Value> = Map::new();
        let mut last_text = String::new();

        for step in 0..self.max_steps {
            let prompt = self.render_prompt(task, &transcript)?;
            let response = self
                .llm
                .generate(LLMRequest {
                    model: self.model.clone(),
                    prompt,
                    system_prompt: None,
                })
                .await
                .map_err(|e| {
                    WorkflowError::ToolInvocation(format!("language model call failed: {}", e))
                })?;

            last_text = response.content;

            let Some((action, action_input)) = extract_action(&last_text) else {
                // No tool action requested, treat the text as the final answer.
                return Ok(LoopOutcome {
                    final_text: last_text,
                    tool_outputs,
                    steps_used: step + 1,
                });
            };

            let observation = match self.tools.iter().find(|t| t.name() == action) {
                Some(tool) => match tool.invoke(action_input.clone()).await {
                    Ok(output) => output,
                    Err(e) => {
                        log::warn!("Tool '{}' failed: {}", action, e);
                        json!({"error": e.to_string()})
                    }
                },
                None => json!({"error": format!("Unknown tool: {}", action)}),
            };

            if let Value::Array(outputs) = tool_outputs
                .entry(action.clone())
                .or_insert_with(|| Value::Array(Vec::new()))
            {
                outputs.push(observation.clone());
            }

            transcript.push_str(&format!(
                "Action: {}\nAction input: {}\nObservation: {}\n\n",
                action, action_input, observation
            ));
        }

        log::warn!(
            "Reasoning loop hit its step cap ({}) without a final answer",
            self.max_steps
        );
        Ok(LoopOutcome {
            final_text: last_text,
            tool_outputs,
            steps_used: self.max_steps,
        })
    }

    fn render_prompt(&self, task: &str, transcript: &str) -> Result<String, WorkflowError> {
        let tools: Vec<Value> = self
            .tools
            .iter()
            .map(|t| json!({"name": t.name(), "description": t.description()}))
            .collect();
        let transcript = if transcript.is_empty() {
            "(none yet)"
        } else {
            transcript
        };
        self.handlebars
            .render_template(
                REACT_STEP_TEMPLATE,
                &json!({"task": task, "tools": tools, "transcript": transcript}),
            )
            .map_err(|e| WorkflowError::Fatal(format!("prompt template render failed: {}", e)))
    }
}

/// The `(action, action_input)` pair from a model reply, if it requested one.
fn extract_action(text: &str) -> Option<(String, Value)> {
    let region = extract_fenced_block(text).unwrap_or(text);
    let open = region.find('{')?;
    let object = balanced_object(&region[open..])?;
    let value: Value = serde_json::from_str(object).ok()?;
    let action = value.get("action")?.as_str()?.to_string();
    let action_input = value.get("action_input").cloned().unwrap_or(json!({}));
    Some((action, action_input))
}
