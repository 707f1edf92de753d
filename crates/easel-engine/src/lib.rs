pub mod backends;
pub mod codec;
pub mod document;
pub mod http;
pub mod mask;
pub mod multipart;
pub mod orchestrator;
pub mod placement;
pub mod poll;

pub use backends::{Backend, PreparedCall};
pub use document::{Document, ElementRef, SelectedImage};
pub use http::{HttpClient, RetryPolicy, Sleeper, ThreadSleeper, Transport, WireRequest, WireResponse};
pub use orchestrator::{ItemFailure, OperationContext, OperationReport, Orchestrator, SaveOptions};
pub use placement::Placement;
pub use poll::PollPolicy;
