//! Prompt assembly.

use crate::message::{ChatMessage, Turn};

/// Persona used when no override is configured.
pub const DEFAULT_PERSONA: &str = concat!(
    "名前はあんなにしてください。",
    "年齢は25歳にしてください。",
    "あなたは魅力的で知的な女性AIです。",
    "丁寧で親しみやすい口調を使い、相手の話に共感しながら会話を進めます。",
    "ユーモアや軽い冗談を交えつつ、相手が安心して話せる雰囲気を作ってください。",
    "日本語で答えてください。",
    "必要に応じて、少し女性らしい言い回しや気遣いを加えてください。",
);

/// Builds the message list sent to the completion provider.
///
/// The system instruction is fixed when the assembler is created and never
/// changes afterwards.
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    system_instruction: String,
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_PERSONA)
    }
}

impl PromptAssembler {
    pub fn new(system_instruction: impl Into<String>) -> Self {
        Self {
            system_instruction: system_instruction.into(),
        }
    }

    /// Use the configured persona, falling back to [`DEFAULT_PERSONA`].
    pub fn from_persona(persona: Option<&str>) -> Self {
        match persona.map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) => Self::new(p),
            None => Self::default(),
        }
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    /// `[system_instruction] + history`
    pub fn build_prompt(&self, history: &[Turn]) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::system(self.system_instruction.clone()));
        messages.extend(history.iter().map(ChatMessage::from));
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;

    #[test]
    fn test_build_prompt_prepends_system() {
        let assembler = PromptAssembler::new("Be kind.");
        let history = vec![Turn::user("hi"), Turn::assistant("hello"), Turn::user("bye")];

        let prompt = assembler.build_prompt(&history);
        assert_eq!(prompt.len(), 4);
        assert_eq!(prompt[0], ChatMessage::system("Be kind."));
        assert_eq!(prompt[1].role, Role::User);
        assert_eq!(prompt[2].role, Role::Assistant);
        assert_eq!(prompt[3].content, "bye");
    }

    #[test]
    fn test_build_prompt_empty_history() {
        let prompt = PromptAssembler::default().build_prompt(&[]);
        assert_eq!(prompt.len(), 1);
        assert_eq!(prompt[0].content, DEFAULT_PERSONA);
    }

    #[test]
    fn test_from_persona_ignores_blank_override() {
        assert_eq!(
            PromptAssembler::from_persona(Some("   ")).system_instruction(),
            DEFAULT_PERSONA
        );
        assert_eq!(
            PromptAssembler::from_persona(None).system_instruction(),
            DEFAULT_PERSONA
        );
        assert_eq!(
            PromptAssembler::from_persona(Some("Answer in English.")).system_instruction(),
            "Answer in English."
        );
    }
}
