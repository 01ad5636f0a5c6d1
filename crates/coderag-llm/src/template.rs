use serde::{Deserialize, Serialize};

use crate::provider::{Message, Role};

/// Prompt layout expected by the chat model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatTemplate {
    #[default]
    #[serde(alias = "llama")]
    Llama3,
    #[serde(alias = "chat-ml")]
    ChatML,
    Mistral,
    #[serde(alias = "phi")]
    Phi3,
    Raw,
}

impl ChatTemplate {
    #[must_use]
    pub fn format(&self, messages: &[Message]) -> String {
        match self {
            Self::Llama3 => format_llama3(messages),
            Self::ChatML => format_chatml(messages),
            Self::Mistral => format_mistral(messages),
            Self::Phi3 => format_phi3(messages),
            Self::Raw => format_raw(messages),
        }
    }

    /// Wrap a rendered prompt as a single user turn.
    #[must_use]
    pub fn format_prompt(&self, prompt: &str) -> String {
        self.format(&[Message::user(prompt)])
    }
}

fn role_tag(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn format_llama3(messages: &[Message]) -> String {
    let mut out = String::from("<|begin_of_text|>");
    for msg in messages {
        out.push_str("<|start_header_id|>");
        out.push_str(role_tag(msg.role));
        out.push_str("<|end_header_id|>\n\n");
        out.push_str(&msg.content);
        out.push_str("<|eot_id|>");
    }
    out.push_str("<|start_header_id|>assistant<|end_header_id|>\n\n");
    out
}

fn format_chatml(messages: &[Message]) -> String {
    let mut out = String::new();
    for msg in messages {
        out.push_str("<|im_start|>");
        out.push_str(role_tag(msg.role));
        out.push('\n');
        out.push_str(&msg.content);
        out.push_str("<|im_end|>\n");
    }
    out.push_str("<|im_start|>assistant\n");
    out
}

fn format_mistral(messages: &[Message]) -> String {
    let mut out = String::new();
    let mut system_text = String::new();

    for msg in messages {
        match msg.role {
            Role::System => {
                if !system_text.is_empty() {
                    system_text.push('\n');
                }
                system_text.push_str(&msg.content);
            }
            Role::User => {
                out.push_str("[INST] ");
                if !system_text.is_empty() {
                    out.push_str(&system_text);
                    out.push_str("\n\n");
                    system_text.clear();
                }
                out.push_str(&msg.content);
                out.push_str(" [/INST]");
            }
            Role::Assistant => {
                out.push_str(&msg.content);
                out.push_str("</s>");
            }
        }
    }
    out
}

fn format_phi3(messages: &[Message]) -> String {
    let mut out = String::new();
    for msg in messages {
        out.push_str("<|");
        out.push_str(role_tag(msg.role));
        out.push_str("|>\n");
        out.push_str(&msg.content);
        out.push_str("<|end|>\n");
    }
    out.push_str("<|assistant|>\n");
    out
}

fn format_raw(messages: &[Message]) -> String {
    let mut out = String::new();
    for msg in messages {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&msg.content);
    }
    out
}
