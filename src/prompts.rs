//! Prompt rendering for analysis calls.

use crate::error::AnalysisError;

use minijinja::{Environment, context};

/// Templates compiled into the binary so prompts are identical across installs.
const TEMPLATES: &[(&str, &str)] = &[
    (
        "ticket_system",
        include_str!("../prompts/ticket_system.md.j2"),
    ),
    ("ticket_user", include_str!("../prompts/ticket_user.md.j2")),
    ("chat_system", include_str!("../prompts/chat_system.md.j2")),
    ("chat_user", include_str!("../prompts/chat_user.md.j2")),
];

/// A rendered system + user prompt pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
}

pub struct PromptEngine {
    env: Environment<'static>,
}

impl std::fmt::Debug for PromptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptEngine").finish_non_exhaustive()
    }
}

impl PromptEngine {
    pub fn new() -> Result<Self, AnalysisError> {
        let mut env = Environment::new();
        env.set_undefined_behavior(minijinja::UndefinedBehavior::Strict);
        for &(name, source) in TEMPLATES {
            env.add_template(name, source)
                .map_err(|error| AnalysisError::Prompt(format!("template {name}: {error}")))?;
        }
        Ok(Self { env })
    }

    pub fn render_ticket(
        &self,
        schema: &str,
        channel_name: &str,
        transcript: &str,
        message_count: usize,
    ) -> Result<RenderedPrompt, AnalysisError> {
        Ok(RenderedPrompt {
            system: self.render("ticket_system", context! {})?,
            user: self.render(
                "ticket_user",
                context! {
                    schema => schema,
                    channel_name => channel_name,
                    transcript => transcript,
                    message_count => message_count,
                },
            )?,
        })
    }

    pub fn render_chat(
        &self,
        schema: &str,
        period_hours: u32,
        transcript: &str,
        message_count: usize,
    ) -> Result<RenderedPrompt, AnalysisError> {
        Ok(RenderedPrompt {
            system: self.render("chat_system", context! {})?,
            user: self.render(
                "chat_user",
                context! {
                    schema => schema,
                    period_hours => period_hours,
                    transcript => transcript,
                    message_count => message_count,
                },
            )?,
        })
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String, AnalysisError> {
        self.env
            .get_template(name)
            .and_then(|template| template.render(ctx))
            .map_err(|error| AnalysisError::Prompt(format!("template {name}: {error}")))
    }
}
