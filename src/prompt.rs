use std::collections::HashMap;

use anyhow::Result;

use crate::models::{ChatMessage, Role, SourceType};

const USER_TEMPLATE: &str = "{input}";

/// Doubles template braces so the text renders literally.
pub fn escape_template(text: &str) -> String {
    text.replace('{', "{{").replace('}', "}}")
}

/// Renders `{name}` placeholders from `vars`; `{{` and `}}` render as single
/// braces. Unknown or unterminated placeholders are errors.
pub fn format_template(template: &str, vars: &HashMap<&str, &str>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => name.push(c),
                        None => anyhow::bail!("unterminated placeholder '{{{name}'"),
                    }
                }
                let value = vars
                    .get(name.trim())
                    .ok_or_else(|| anyhow::anyhow!("missing template variable '{}'", name.trim()))?;
                out.push_str(value);
            }
            '}' => anyhow::bail!("single '}}' in template"),
            _ => out.push(ch),
        }
    }

    Ok(out)
}

/// Conversation serialized the way it is embedded in the system prompt.
pub fn history_as_text(history: &[ChatMessage]) -> String {
    history
        .iter()
        .map(|message| {
            let speaker = match message.role {
                Role::User => "Human",
                Role::Assistant => "AI",
                Role::System => "System",
            };
            format!("{speaker}: {}", message.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// System message template for a chain. `escaped_document` must already have
/// its braces doubled; the history is escaped here.
pub fn build_system_prompt(
    escaped_document: &str,
    source: SourceType,
    history: &[ChatMessage],
) -> String {
    let label = source.label();
    let history_text = escape_template(&history_as_text(history));

    format!(
        "Você é um assistente amigável chamado Oráculo.\n\
         Você possui acesso às seguintes informações vindas de um documento {label}:\n\
         \n\
         ####\n\
         {escaped_document}\n\
         ####\n\
         \n\
         Histórico da conversa:\n\
         {history_text}\n\
         \n\
         Utilize as informações fornecidas e o histórico da conversa para basear as suas respostas.\n\
         \n\
         Sempre que houver $ na sua saída, substitua por S.\n\
         \n\
         Se a informação do documento for algo como \"Just a moment...Enable JavaScript and cookies to continue\" \
         sugira ao usuário carregar novamente o Oráculo!"
    )
}

/// A system template plus the user turn template.
#[derive(Debug, Clone)]
pub struct ChatTemplate {
    system: String,
    user: String,
}

impl ChatTemplate {
    pub fn new(system: String) -> Self {
        Self {
            system,
            user: USER_TEMPLATE.to_string(),
        }
    }

    pub fn system_template(&self) -> &str {
        &self.system
    }

    /// System message, then the prior conversation, then the new user turn.
    pub fn render(&self, input: &str, history: &[ChatMessage]) -> Result<Vec<ChatMessage>> {
        let mut vars = HashMap::new();
        vars.insert("input", input);

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(format_template(&self.system, &vars)?));
        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::user(format_template(&self.user, &vars)?));
        Ok(messages)
    }
}
