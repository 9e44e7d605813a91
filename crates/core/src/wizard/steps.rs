use serde::{Deserialize, Serialize};

/// Which free-text answer the wizard is waiting for. `None` while a choice
/// step is waiting on a component interaction instead of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AwaitingInput {
    None,
    Title,
    Description,
    Color,
    PanelImageUrl,
    WelcomeImageUrl,
    WelcomeMessage,
    Footer,
    Categories,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepKind {
    Text(AwaitingInput),
    Choice,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WizardStep {
    PanelType,
    PanelTitle,
    PanelDescription,
    EmbedColor,
    PanelImage,
    WelcomeImage,
    WelcomeMessage,
    EmbedFooter,
    PingRoles,
    AccessRoles,
    Categories,
}

impl WizardStep {
    pub const ALL: [WizardStep; 11] = [
        WizardStep::PanelType,
        WizardStep::PanelTitle,
        WizardStep::PanelDescription,
        WizardStep::EmbedColor,
        WizardStep::PanelImage,
        WizardStep::WelcomeImage,
        WizardStep::WelcomeMessage,
        WizardStep::EmbedFooter,
        WizardStep::PingRoles,
        WizardStep::AccessRoles,
        WizardStep::Categories,
    ];

    pub const COUNT: u8 = 11;

    pub fn first() -> Self {
        Self::PanelType
    }

    /// 1-based position shown to operators.
    pub fn number(&self) -> u8 {
        match self {
            Self::PanelType => 1,
            Self::PanelTitle => 2,
            Self::PanelDescription => 3,
            Self::EmbedColor => 4,
            Self::PanelImage => 5,
            Self::WelcomeImage => 6,
            Self::WelcomeMessage => 7,
            Self::EmbedFooter => 8,
            Self::PingRoles => 9,
            Self::AccessRoles => 10,
            Self::Categories => 11,
        }
    }

    pub fn next(&self) -> Option<Self> {
        Self::ALL.get(usize::from(self.number())).copied()
    }

    pub fn kind(&self) -> StepKind {
        match self {
            Self::PanelType | Self::PingRoles | Self::AccessRoles => StepKind::Choice,
            Self::PanelTitle => StepKind::Text(AwaitingInput::Title),
            Self::PanelDescription => StepKind::Text(AwaitingInput::Description),
            Self::EmbedColor => StepKind::Text(AwaitingInput::Color),
            Self::PanelImage => StepKind::Text(AwaitingInput::PanelImageUrl),
            Self::WelcomeImage => StepKind::Text(AwaitingInput::WelcomeImageUrl),
            Self::WelcomeMessage => StepKind::Text(AwaitingInput::WelcomeMessage),
            Self::EmbedFooter => StepKind::Text(AwaitingInput::Footer),
            Self::Categories => StepKind::Text(AwaitingInput::Categories),
        }
    }

    pub fn awaiting(&self) -> AwaitingInput {
        match self.kind() {
            StepKind::Text(awaiting) => awaiting,
            StepKind::Choice => AwaitingInput::None,
        }
    }

    /// Component id segment for choice steps: `ticket_setup_<slug>_<user>`.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::PanelType => "paneltype",
            Self::PanelTitle => "title",
            Self::PanelDescription => "description",
            Self::EmbedColor => "color",
            Self::PanelImage => "panelimage",
            Self::WelcomeImage => "welcomeimage",
            Self::WelcomeMessage => "welcomemessage",
            Self::EmbedFooter => "footer",
            Self::PingRoles => "pingroles",
            Self::AccessRoles => "accessroles",
            Self::Categories => "categories",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|step| step.slug() == slug)
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::PanelType => "Panel type",
            Self::PanelTitle => "Panel title",
            Self::PanelDescription => "Panel description",
            Self::EmbedColor => "Embed color",
            Self::PanelImage => "Panel image",
            Self::WelcomeImage => "Welcome image",
            Self::WelcomeMessage => "Welcome message",
            Self::EmbedFooter => "Embed footer",
            Self::PingRoles => "Ping roles",
            Self::AccessRoles => "Access roles",
            Self::Categories => "Ticket categories",
        }
    }

    pub fn instructions(&self) -> &'static str {
        match self {
            Self::PanelType => "Choose how members open tickets: buttons, a dropdown menu or reactions.",
            Self::PanelTitle => "Send the panel title (up to 256 characters).",
            Self::PanelDescription => "Send the panel description (up to 2048 characters).",
            Self::EmbedColor => "Send a hex color such as #FF0000.",
            Self::PanelImage => "Send a jpg, jpeg, png or gif image URL for the panel, or `none`.",
            Self::WelcomeImage => {
                "Send a jpg, jpeg, png or gif image URL for the welcome message, or `none`."
            }
            Self::WelcomeMessage => {
                "Send the welcome message for new tickets (`{user}` mentions the creator), or `none`."
            }
            Self::EmbedFooter => "Send the embed footer text, or `none`.",
            Self::PingRoles => "Pick the roles pinged when a ticket opens, or `No pings`.",
            Self::AccessRoles => "Pick the roles that can see every ticket, or `No roles`.",
            Self::Categories => {
                "Send one category per message as `<label> <value> <description> <emoji>`. Send `done` when finished."
            }
        }
    }
}
