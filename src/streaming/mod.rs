pub mod assembler;
pub mod frame;
pub mod payload;

pub use assembler::{ContentAssembler, GENERAL_SECTION_ID, Section, SectionKind};
pub use frame::{FrameParser, SseEvent};
pub use payload::{Node, NodePayload, SearchStep, normalize_steps};
