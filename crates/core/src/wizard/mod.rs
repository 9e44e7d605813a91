pub mod clock;
pub mod draft;
pub mod engine;
pub mod panel;
pub mod session;
pub mod steps;

pub use clock::{Clock, ManualClock, SystemClock};
pub use draft::DraftConfig;
pub use engine::{
    parse_setup_custom_id, setup_custom_id, Advance, ChoiceOption, Prompt, PromptInput, Rejection,
    StepError, WizardEngine, WizardInput,
};
pub use panel::{
    create_ticket_custom_id, parse_create_ticket_custom_id, plan_panel, PanelButton,
    PanelComponents, PanelEmbed, PanelMenuOption, PanelPlan, PanelPlanError, SkipReason,
    SkippedCategory,
};
pub use session::{
    RoleOption, SessionKey, SessionLookup, SessionSnapshot, SessionStore, WizardSession,
};
pub use steps::{AwaitingInput, StepKind, WizardStep};
