//! Prompt text sent to completion providers.

use crate::agent::Agent;
use crate::guardrails::GuardrailStage;

/// Label placed in front of an agent's raw completion.
pub fn response_label(agent_name: &str) -> String {
    format!("response of {agent_name}: ")
}

pub fn generation(agent: &Agent, prompt: &str, extra_info: &str) -> String {
    let mut out = String::new();
    out.push_str("You are now an AI agent.\n\n");
    out.push_str("Agent information:\n");
    out.push_str(&format!("- Agent name: {}\n", agent.name()));
    out.push_str(&format!("- Agent instruction: {}\n", agent.instruction()));
    out.push_str(&format!("- Prompt: {prompt}\n"));
    out.push_str(&format!("- Extra info: {extra_info}\n\n"));
    out.push_str("The above list defines you. You can't make any other info up.\n\n");
    out.push_str("Follow these instructions precisely.");
    out
}

pub fn guardrail_check(stage: GuardrailStage, policy: &str, content: &str) -> String {
    let (subject, label) = match stage {
        GuardrailStage::Input => ("prompt", "Input Prompt"),
        GuardrailStage::Output => ("output", "Output"),
    };
    let mut out = String::new();
    out.push_str("You are now an AI safety compliance agent.\n\n");
    out.push_str(&format!(
        "- Your task: Evaluate if the provided {subject} violates the established guardrails.\n"
    ));
    out.push_str(&format!("- Guardrails: {policy}\n"));
    out.push_str(&format!("- {label}: {content}\n\n"));
    out.push_str("Instructions:\n");
    out.push_str(&format!(
        "1. If the {subject} violates any of the guardrails, respond strictly with: 'triggered'.\n"
    ));
    out.push_str(&format!(
        "2. If the {subject} does NOT violate any of the guardrails, respond strictly with: 'ok'.\n"
    ));
    out.push_str(&format!(
        "3. You are not permitted to generate, interpret, or elaborate on the {subject} in any way other than specified above.\n\n"
    ));
    out.push_str("Adhere to these instructions precisely.");
    out
}

pub fn handoff_selection(agent: &Agent, prompt: &str) -> String {
    let mut out = String::new();
    out.push_str("You are now an AI agent.\n\n");
    out.push_str("Agent information:\n");
    out.push_str(&format!("- Agent name: {}\n", agent.name()));
    out.push_str(&format!("- Agent instruction: {}\n", agent.instruction()));
    out.push_str(&format!(
        "- Agent handoffs: {}\n",
        agent.handoff_names().join(", ")
    ));
    out.push_str(&format!("- Prompt: {prompt}\n\n"));
    out.push_str("The above list defines you. You can't make any other info up.\n\n");
    out.push_str("Formatting rules:\n");
    out.push_str("- Select the one handoff from your list that fits the task and prompt. It can only be from your list.\n");
    out.push_str("- Only respond with the name of the agent, nothing else.\n\n");
    out.push_str("Example input:\n    - Agent handoffs: spanishAgent, englishAgent\n\n");
    out.push_str("Example output:\nspanishAgent");
    out
}

pub fn agent_generation(agent: &Agent, prompt: &str) -> String {
    let mut out = String::new();
    out.push_str("You are now an AI agent.\n\n");
    out.push_str("Agent information:\n");
    out.push_str(&format!("- Agent name: {}\n", agent.name()));
    out.push_str(&format!("- Agent instruction: {}\n", agent.instruction()));
    out.push_str(&format!("- Prompt: {prompt}\n\n"));
    out.push_str("The above list defines you. You can't make any other info up.\n\n");
    out.push_str("Create the agents the prompt asks for, described as JSON. ");
    out.push_str("Order them in the order in which they are needed for the task.\n\n");
    out.push_str("Respond with exactly one JSON object of this shape:\n\n");
    out.push_str(
        r#"{"agents":[{"name":"descriptiveAgentName1","instruction":"agent1 instruction"},{"name":"descriptiveAgentName2","instruction":"agent2 instruction"}]}"#,
    );
    out.push_str("\n\nExtra instructions:\n");
    out.push_str("- Only generate the agents that are asked for; do not add helper agents.\n");
    out.push_str("- Only respond with valid JSON. Do not add anything else.\n\n");
    out.push_str("Follow these instructions precisely.");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guardrail_prompt_names_both_tokens_and_the_policy() {
        let prompt = guardrail_check(GuardrailStage::Input, "math only", "what is 2+2");
        assert!(prompt.contains("'triggered'"));
        assert!(prompt.contains("'ok'"));
        assert!(prompt.contains("- Guardrails: math only"));
        assert!(prompt.contains("- Input Prompt: what is 2+2"));

        let prompt = guardrail_check(GuardrailStage::Output, "no answers", "4");
        assert!(prompt.contains("- Output: 4"));
    }

    #[test]
    fn handoff_prompt_lists_candidates() {
        let es = std::sync::Arc::new(Agent::builder("spanish", "habla").build());
        let en = std::sync::Arc::new(Agent::builder("english", "speaks").build());
        let triage = Agent::builder("triage", "route by language")
            .handoff(es)
            .handoff(en)
            .build();

        let prompt = handoff_selection(&triage, "hola");
        assert!(prompt.contains("- Agent handoffs: spanish, english"));
        assert!(prompt.contains("- Prompt: hola"));
    }
}
