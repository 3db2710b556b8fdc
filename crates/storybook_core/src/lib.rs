pub mod domain;
pub mod ports;

pub use domain::{
    Alignment, AlignmentError, Generation, NarratedAudio, NewPage, Page, PageDraft, ProviderVoice,
    Story, User, VoiceProfile,
};
pub use ports::{
    DatabaseService, IllustrationService, NarrativeService, PortError, PortResult,
    SpeechSynthesisService,
};
