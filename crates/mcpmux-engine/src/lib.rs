//! Protocol engine: session lifecycle, the progress/change/subscription/
//! resource/root/sampling managers, and the standard-method dispatcher that
//! ties them to incoming JSON-RPC envelopes.

#![forbid(unsafe_code)]

pub mod change_notifier;
pub mod dispatcher;
pub mod progress;
pub mod resource;
pub mod root;
pub mod sampling;
pub mod session;
pub mod subscription;

pub use change_notifier::{ChangeNotifier, ChangeSubscriber};
pub use dispatcher::{BoxFuture, Dispatcher, MethodHandler};
pub use progress::{ProgressListener, ProgressManager};
pub use resource::{
    JsonTransformer, MarkdownTransformer, ResourceManager, ResourceSearchFilter, ResourceTransformer,
    SummaryTransformer,
};
pub use root::{RootManager, RootOperation};
pub use sampling::{HumanControlPolicy, SamplingHandler, SamplingManager};
pub use session::{is_pre_ready_method, Session, SessionLifecycle};
pub use subscription::{ResourceUpdate, Subscription, SubscriptionManager, SubscriptionSink};
