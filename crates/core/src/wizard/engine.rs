use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use crate::domain::category::{parse_category_with_emoji, Category};
use crate::domain::guild_config::PanelType;
use crate::domain::ids::{ChannelId, RoleId, UserId};
use crate::domain::validation::{
    is_none_token, parse_hex_color, parse_image_url, parse_optional_text,
    parse_panel_description, parse_panel_title, parse_panel_type, ValidationError,
    EMBED_FOOTER_MAX_CHARS, NONE_TOKEN, WELCOME_MESSAGE_MAX_CHARS,
};
use crate::wizard::draft::DraftConfig;
use crate::wizard::session::{SessionKey, SessionSnapshot, WizardSession};
use crate::wizard::steps::{StepKind, WizardStep};

pub const SETUP_CUSTOM_ID_PREFIX: &str = "ticket_setup_";
pub const DONE_TOKEN: &str = "done";

/// One answer from the operator, however it arrived.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WizardInput {
    Text(String),
    Choice(Vec<String>),
}

impl WizardInput {
    fn kind_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Choice(_) => "choice",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub label: String,
    pub value: String,
    pub description: Option<String>,
}

impl ChoiceOption {
    fn new(
        label: impl Into<String>,
        value: impl Into<String>,
        description: Option<String>,
    ) -> Self {
        Self { label: label.into(), value: value.into(), description }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromptInput {
    Text,
    Choice { custom_id: String, options: Vec<ChoiceOption>, max_values: usize },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub step: WizardStep,
    pub heading: String,
    pub body: String,
    pub input: PromptInput,
    /// Set when the prompt is re-issued after a rejected answer.
    pub error: Option<String>,
}

impl Prompt {
    fn with_error(mut self, error: &StepError) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StepError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("this step expects {expected}, not a {received} answer")]
    WrongInputKind { expected: &'static str, received: &'static str },
    #[error("pick exactly one option")]
    SingleSelection,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rejection {
    pub error: StepError,
    /// The same step's prompt, annotated with the error.
    pub prompt: Prompt,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Advance {
    Next(Prompt),
    CategoryAdded { category: Category, total: usize, prompt: Prompt },
    Complete(DraftConfig),
}

/// Drives the fixed eleven-step setup dialogue. Stateless; all state lives in
/// the [`WizardSession`] it is handed.
#[derive(Clone, Copy, Debug, Default)]
pub struct WizardEngine;

impl WizardEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn begin(
        &self,
        key: SessionKey,
        target_channel: ChannelId,
        origin_channel: ChannelId,
        draft: DraftConfig,
        snapshot: SessionSnapshot,
        now: DateTime<Utc>,
    ) -> (WizardSession, Prompt) {
        let session =
            WizardSession::new(key, target_channel, origin_channel, draft, snapshot, now);
        let prompt = self.prompt(&session);
        (session, prompt)
    }

    pub fn prompt(&self, session: &WizardSession) -> Prompt {
        let step = session.step;
        let heading = format!(
            "Ticket setup - step {}/{}: {}",
            step.number(),
            WizardStep::COUNT,
            step.title()
        );
        let mut body = step.instructions().to_owned();
        if step == WizardStep::Categories && !session.draft.ticket_categories.is_empty() {
            body.push_str(&format!(
                "\n{} categor{} added so far.",
                session.draft.ticket_categories.len(),
                if session.draft.ticket_categories.len() == 1 { "y" } else { "ies" }
            ));
        }
        if matches!(step, WizardStep::PingRoles | WizardStep::AccessRoles)
            && session.snapshot.roles.is_empty()
        {
            body.push_str(
                "\nThere are no assignable roles yet. Add them later with `ticket pingrole` \
                 or `ticket accessrole`.",
            );
        }
        if matches!(step, WizardStep::PingRoles | WizardStep::AccessRoles)
            && session.snapshot.omitted_roles > 0
        {
            body.push_str(&format!(
                "\nOnly the first {} roles fit in this menu; {} more can be added later with \
                 `ticket pingrole` or `ticket accessrole`.",
                session.snapshot.roles.len(),
                session.snapshot.omitted_roles
            ));
        }

        let input = match step.kind() {
            StepKind::Text(_) => PromptInput::Text,
            StepKind::Choice => {
                let options = choice_options(step, &session.snapshot);
                let max_values = match step {
                    WizardStep::PanelType => 1,
                    _ => options.len(),
                };
                PromptInput::Choice {
                    custom_id: setup_custom_id(step, &session.key.user_id),
                    options,
                    max_values,
                }
            }
        };

        Prompt { step, heading, body, input, error: None }
    }

    /// Validates `input` against the current step. On success the draft is
    /// updated, the inactivity timer is reset and the step moves forward; on
    /// failure nothing about the session changes.
    pub fn advance(
        &self,
        session: &mut WizardSession,
        input: WizardInput,
        now: DateTime<Utc>,
    ) -> Result<Advance, Rejection> {
        match self.apply(session, input) {
            Ok(advance) => {
                session.last_activity = now;
                Ok(advance)
            }
            Err(error) => {
                let prompt = self.prompt(session).with_error(&error);
                Err(Rejection { error, prompt })
            }
        }
    }

    pub fn advance_with_audit<S>(
        &self,
        session: &mut WizardSession,
        input: WizardInput,
        now: DateTime<Utc>,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<Advance, Rejection>
    where
        S: AuditSink + ?Sized,
    {
        let from = session.step;
        let result = self.advance(session, input, now);
        match &result {
            Ok(Advance::Complete(draft)) => {
                sink.emit(
                    audit
                        .event("wizard.completed", AuditCategory::Wizard, AuditOutcome::Success)
                        .with_metadata("panel_type", draft.panel_type.as_str())
                        .with_metadata("categories", draft.ticket_categories.len().to_string()),
                );
            }
            Ok(Advance::CategoryAdded { category, total, .. }) => {
                sink.emit(
                    audit
                        .event("wizard.step_accepted", AuditCategory::Wizard, AuditOutcome::Success)
                        .with_metadata("from", format!("{from:?}"))
                        .with_metadata("to", format!("{:?}", session.step))
                        .with_metadata("category", category.value.clone())
                        .with_metadata("total", total.to_string()),
                );
            }
            Ok(Advance::Next(_)) => {
                sink.emit(
                    audit
                        .event("wizard.step_accepted", AuditCategory::Wizard, AuditOutcome::Success)
                        .with_metadata("from", format!("{from:?}"))
                        .with_metadata("to", format!("{:?}", session.step)),
                );
            }
            Err(rejection) => {
                let event = audit.event(
                    "wizard.step_rejected",
                    AuditCategory::Wizard,
                    AuditOutcome::Rejected,
                );
                sink.emit(
                    event
                        .with_metadata("step", format!("{from:?}"))
                        .with_metadata("error", rejection.error.to_string()),
                );
            }
        }
        result
    }

    fn apply(&self, session: &mut WizardSession, input: WizardInput) -> Result<Advance, StepError> {
        let step = session.step;
        match (step.kind(), input) {
            (StepKind::Text(_), WizardInput::Text(text)) => self.apply_text(session, &text),
            (StepKind::Choice, WizardInput::Choice(values)) => {
                self.apply_choice(session, &values)
            }
            (StepKind::Text(_), received) => Err(StepError::WrongInputKind {
                expected: "a text message",
                received: received.kind_name(),
            }),
            (StepKind::Choice, received) => Err(StepError::WrongInputKind {
                expected: "a selection from the menu",
                received: received.kind_name(),
            }),
        }
    }

    fn apply_text(&self, session: &mut WizardSession, text: &str) -> Result<Advance, StepError> {
        let draft = &mut session.draft;
        match session.step {
            WizardStep::PanelTitle => draft.panel_title = parse_panel_title(text)?,
            WizardStep::PanelDescription => draft.panel_description = parse_panel_description(text),
            WizardStep::EmbedColor => draft.embed_color = parse_hex_color(text)?,
            WizardStep::PanelImage => draft.panel_image = parse_image_url(text)?,
            WizardStep::WelcomeImage => draft.welcome_image = parse_image_url(text)?,
            WizardStep::WelcomeMessage => {
                draft.welcome_message = parse_optional_text(text, WELCOME_MESSAGE_MAX_CHARS)
            }
            WizardStep::EmbedFooter => {
                draft.embed_footer = parse_optional_text(text, EMBED_FOOTER_MAX_CHARS)
            }
            WizardStep::Categories => return self.apply_category_line(session, text),
            WizardStep::PanelType | WizardStep::PingRoles | WizardStep::AccessRoles => {
                return Err(StepError::WrongInputKind {
                    expected: "a selection from the menu",
                    received: "text",
                });
            }
        }
        Ok(self.move_forward(session))
    }

    fn apply_category_line(
        &self,
        session: &mut WizardSession,
        line: &str,
    ) -> Result<Advance, StepError> {
        if line.trim().eq_ignore_ascii_case(DONE_TOKEN) {
            if session.draft.ticket_categories.is_empty() {
                return Err(ValidationError::NoCategories.into());
            }
            return Ok(Advance::Complete(session.draft.clone()));
        }

        let category = parse_category_with_emoji(line, &session.snapshot.emojis)?;
        session.draft.push_category(category.clone())?;
        Ok(Advance::CategoryAdded {
            category,
            total: session.draft.ticket_categories.len(),
            prompt: self.prompt(session),
        })
    }

    fn apply_choice(
        &self,
        session: &mut WizardSession,
        values: &[String],
    ) -> Result<Advance, StepError> {
        if values.is_empty() {
            return Err(ValidationError::EmptySelection.into());
        }

        match session.step {
            WizardStep::PanelType => {
                let [value] = values else {
                    return Err(StepError::SingleSelection);
                };
                session.draft.panel_type = parse_panel_type(value)?;
            }
            WizardStep::PingRoles => {
                session.draft.ping_roles = parse_role_selection(values, &session.snapshot)?;
            }
            WizardStep::AccessRoles => {
                session.draft.access_roles = parse_role_selection(values, &session.snapshot)?;
            }
            _ => {
                return Err(StepError::WrongInputKind {
                    expected: "a text message",
                    received: "choice",
                });
            }
        }
        Ok(self.move_forward(session))
    }

    fn move_forward(&self, session: &mut WizardSession) -> Advance {
        if let Some(next) = session.step.next() {
            session.step = next;
        }
        Advance::Next(self.prompt(session))
    }
}

/// `none` anywhere in the selection clears the set.
fn parse_role_selection(
    values: &[String],
    snapshot: &SessionSnapshot,
) -> Result<BTreeSet<RoleId>, ValidationError> {
    if values.iter().any(|value| is_none_token(value)) {
        return Ok(BTreeSet::new());
    }

    values
        .iter()
        .map(|value| {
            if snapshot.has_role(value) {
                Ok(RoleId::new(value.clone()))
            } else {
                Err(ValidationError::UnknownRole(value.clone()))
            }
        })
        .collect()
}

fn choice_options(step: WizardStep, snapshot: &SessionSnapshot) -> Vec<ChoiceOption> {
    match step {
        WizardStep::PanelType => PanelType::ALL
            .iter()
            .map(|panel_type| {
                let (label, description) = match panel_type {
                    PanelType::Buttons => ("Buttons", "One button per category"),
                    PanelType::Menu => ("Dropdown menu", "A single menu listing every category"),
                    PanelType::Reactions => ("Reactions", "One emoji reaction per category"),
                };
                ChoiceOption::new(label, panel_type.as_str(), Some(description.to_owned()))
            })
            .collect(),
        WizardStep::PingRoles | WizardStep::AccessRoles => {
            let none = if step == WizardStep::PingRoles {
                ChoiceOption::new("No pings", NONE_TOKEN, Some("Nobody is pinged".to_owned()))
            } else {
                ChoiceOption::new("No roles", NONE_TOKEN, Some("No automatic access".to_owned()))
            };
            std::iter::once(none)
                .chain(snapshot.roles.iter().map(|role| {
                    ChoiceOption::new(
                        role.name.clone(),
                        role.id.as_str(),
                        Some(format!("Role: {}", role.name)),
                    )
                }))
                .collect()
        }
        _ => Vec::new(),
    }
}

pub fn setup_custom_id(step: WizardStep, user_id: &UserId) -> String {
    format!("{SETUP_CUSTOM_ID_PREFIX}{}_{}", step.slug(), user_id)
}

/// Splits `ticket_setup_<step>_<user>` back into its parts.
pub fn parse_setup_custom_id(custom_id: &str) -> Option<(WizardStep, UserId)> {
    let rest = custom_id.strip_prefix(SETUP_CUSTOM_ID_PREFIX)?;
    let (slug, user) = rest.rsplit_once('_')?;
    let step = WizardStep::from_slug(slug)?;
    (!user.is_empty()).then(|| (step, UserId::new(user)))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{
        parse_setup_custom_id, setup_custom_id, Advance, PromptInput, StepError, WizardEngine,
        WizardInput,
    };
    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::domain::category::Category;
    use crate::domain::guild_config::{GuildConfig, PanelType};
    use crate::domain::ids::{ChannelId, EmojiId, GuildId, RoleId, UserId};
    use crate::domain::validation::ValidationError;
    use crate::emoji::EmojiRegistry;
    use crate::wizard::draft::DraftConfig;
    use crate::wizard::session::{RoleOption, SessionKey, SessionSnapshot, WizardSession};
    use crate::wizard::steps::WizardStep;

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 10, 8, 30, 0).single().expect("valid time")
    }

    fn snapshot() -> SessionSnapshot {
        SessionSnapshot::new(
            vec![
                RoleOption { id: RoleId::new("900"), name: "Support".to_owned() },
                RoleOption { id: RoleId::new("901"), name: "Moderators".to_owned() },
            ],
            EmojiRegistry::new([EmojiId::new("404")]),
        )
    }

    fn start() -> (WizardEngine, WizardSession) {
        let engine = WizardEngine::new();
        let guild = GuildId::new("1");
        let (session, prompt) = engine.begin(
            SessionKey::new(guild.clone(), UserId::new("42")),
            ChannelId::new("10"),
            ChannelId::new("11"),
            DraftConfig::from_config(&GuildConfig::new(guild)),
            snapshot(),
            now(),
        );
        assert_eq!(prompt.step, WizardStep::PanelType);
        (engine, session)
    }

    fn text(value: &str) -> WizardInput {
        WizardInput::Text(value.to_owned())
    }

    fn choice(values: &[&str]) -> WizardInput {
        WizardInput::Choice(values.iter().map(|value| (*value).to_owned()).collect())
    }

    fn answers() -> Vec<WizardInput> {
        vec![
            choice(&["buttons"]),
            text("Help Desk"),
            text("Open a ticket below"),
            text("#00ff99"),
            text("https://cdn.example.com/panel.png"),
            text("none"),
            text("Hi {user}, staff will be with you shortly."),
            text("Support team"),
            choice(&["900"]),
            choice(&["900", "901"]),
            text("Bug bug Report a broken feature 🐛"),
            text("done"),
        ]
    }

    #[test]
    fn valid_answers_complete_after_eleven_steps() {
        let (engine, mut session) = start();
        let mut steps_seen = Vec::new();
        let mut completed = None;

        for input in answers() {
            steps_seen.push(session.step);
            match engine.advance(&mut session, input, now()).expect("valid answer") {
                Advance::Complete(draft) => completed = Some(draft),
                Advance::Next(_) | Advance::CategoryAdded { .. } => {}
            }
        }

        let mut distinct = steps_seen.clone();
        distinct.dedup();
        assert_eq!(distinct, WizardStep::ALL.to_vec());

        let draft = completed.expect("wizard completed");
        assert_eq!(draft.panel_type, PanelType::Buttons);
        assert_eq!(draft.panel_title, "Help Desk");
        assert_eq!(draft.panel_description, "Open a ticket below");
        assert_eq!(draft.embed_color, "#00ff99");
        assert_eq!(draft.panel_image.as_deref(), Some("https://cdn.example.com/panel.png"));
        assert_eq!(draft.welcome_image, None);
        assert_eq!(
            draft.welcome_message.as_deref(),
            Some("Hi {user}, staff will be with you shortly.")
        );
        assert_eq!(draft.embed_footer.as_deref(), Some("Support team"));
        assert_eq!(draft.ping_roles.len(), 1);
        assert_eq!(draft.access_roles.len(), 2);
        assert_eq!(
            draft.ticket_categories,
            vec![Category::new("Bug", "bug", "Report a broken feature", "🐛")]
        );
    }

    #[test]
    fn invalid_color_leaves_session_unchanged_and_reprompts() {
        let (engine, mut session) = start();
        for input in answers().into_iter().take(3) {
            engine.advance(&mut session, input, now()).expect("valid answer");
        }
        assert_eq!(session.step, WizardStep::EmbedColor);
        let before = session.clone();

        let rejection = engine
            .advance(&mut session, text("red"), now() + Duration::minutes(1))
            .expect_err("red is not a hex color");

        assert_eq!(session, before);
        assert_eq!(rejection.prompt.step, WizardStep::EmbedColor);
        assert!(rejection.prompt.error.as_deref().is_some_and(|error| error.contains("red")));
        assert_eq!(
            rejection.error,
            StepError::Invalid(ValidationError::InvalidColor("red".to_owned()))
        );
    }

    #[test]
    fn accepted_input_resets_the_inactivity_timer() {
        let (engine, mut session) = start();
        let later = now() + Duration::minutes(3);
        engine.advance(&mut session, choice(&["menu"]), later).expect("valid answer");
        assert_eq!(session.last_activity, later);
    }

    #[test]
    fn text_at_a_choice_step_is_rejected() {
        let (engine, mut session) = start();
        let rejection = engine.advance(&mut session, text("buttons"), now()).expect_err("kind");

        assert!(matches!(rejection.error, StepError::WrongInputKind { .. }));
        assert_eq!(session.step, WizardStep::PanelType);
    }

    #[test]
    fn panel_type_takes_a_single_value() {
        let (engine, mut session) = start();
        let rejection =
            engine.advance(&mut session, choice(&["menu", "buttons"]), now()).expect_err("two");
        assert_eq!(rejection.error, StepError::SingleSelection);
    }

    #[test]
    fn role_steps_reject_unknown_roles_and_clear_on_none() {
        let (engine, mut session) = start();
        session.step = WizardStep::PingRoles;
        session.draft.ping_roles.insert(RoleId::new("900"));

        let rejection =
            engine.advance(&mut session, choice(&["123"]), now()).expect_err("unknown role");
        assert_eq!(rejection.error, StepError::Invalid(ValidationError::UnknownRole("123".into())));

        engine.advance(&mut session, choice(&["900", "none"]), now()).expect("none clears");
        assert!(session.draft.ping_roles.is_empty());
        assert_eq!(session.step, WizardStep::AccessRoles);
    }

    #[test]
    fn done_without_categories_is_rejected() {
        let (engine, mut session) = start();
        session.step = WizardStep::Categories;
        session.draft.panel_type = PanelType::Reactions;

        let rejection = engine.advance(&mut session, text("DONE"), now()).expect_err("empty");
        assert_eq!(rejection.error, StepError::Invalid(ValidationError::NoCategories));
        assert_eq!(session.step, WizardStep::Categories);
    }

    #[test]
    fn category_lines_are_validated_against_the_snapshot() {
        let (engine, mut session) = start();
        session.step = WizardStep::Categories;

        let added = engine
            .advance(&mut session, text("Vip vip Priority lane <:vip:404>"), now())
            .expect("registered emoji");
        assert!(matches!(added, Advance::CategoryAdded { total: 1, .. }));

        let unknown = engine
            .advance(&mut session, text("Ops ops Ops work <:ops:555>"), now())
            .expect_err("unregistered emoji");
        assert_eq!(
            unknown.error,
            StepError::Invalid(ValidationError::InvalidEmoji("<:ops:555>".to_owned()))
        );

        let duplicate = engine
            .advance(&mut session, text("VIP vip Second lane ⭐"), now())
            .expect_err("duplicate value");
        assert_eq!(
            duplicate.error,
            StepError::Invalid(ValidationError::DuplicateCategory("vip".to_owned()))
        );

        let short = engine.advance(&mut session, text("Ops ops 🔧"), now()).expect_err("short");
        assert_eq!(
            short.error,
            StepError::Invalid(ValidationError::MalformedCategory { token_count: 3 })
        );
        assert_eq!(session.draft.ticket_categories.len(), 1);
    }

    #[test]
    fn role_prompt_offers_none_first() {
        let (engine, mut session) = start();
        session.step = WizardStep::AccessRoles;

        let prompt = engine.prompt(&session);
        match prompt.input {
            PromptInput::Choice { custom_id, options, max_values } => {
                assert_eq!(custom_id, "ticket_setup_accessroles_42");
                assert_eq!(options[0].value, "none");
                assert_eq!(options.len(), 3);
                assert_eq!(max_values, 3);
            }
            PromptInput::Text => panic!("role steps are choice prompts"),
        }
    }

    #[test]
    fn role_prompt_mentions_roles_left_out_of_the_menu() {
        let (engine, mut session) = start();
        session.step = WizardStep::PingRoles;
        assert!(!engine.prompt(&session).body.contains("more can be added later"));

        session.snapshot.omitted_roles = 3;
        let body = engine.prompt(&session).body;
        assert!(body.contains("Only the first 2 roles fit in this menu"));
        assert!(body.contains("3 more can be added later"));
    }

    #[test]
    fn audit_records_accepted_and_rejected_steps() {
        let (engine, mut session) = start();
        let sink = InMemoryAuditSink::default();
        let audit = AuditContext::new(
            Some(GuildId::new("1")),
            Some(UserId::new("42")),
            "evt-9",
            "setup-wizard",
        );

        engine
            .advance_with_audit(&mut session, choice(&["menu"]), now(), &sink, &audit)
            .expect("accepted");
        let _ = engine.advance_with_audit(&mut session, text("  "), now(), &sink, &audit);

        assert_eq!(
            sink.event_types(),
            vec!["wizard.step_accepted".to_owned(), "wizard.step_rejected".to_owned()]
        );
        assert_eq!(sink.events()[1].metadata.get("step").map(String::as_str), Some("PanelTitle"));
    }

    #[test]
    fn setup_custom_ids_round_trip() {
        let id = setup_custom_id(WizardStep::PingRoles, &UserId::new("77"));
        assert_eq!(parse_setup_custom_id(&id), Some((WizardStep::PingRoles, UserId::new("77"))));
        assert_eq!(parse_setup_custom_id("ticket_create_bug"), None);
    }
}
