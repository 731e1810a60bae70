pub mod codec;
pub mod registry;
pub mod reporter;
pub mod server;

pub use codec::ResourceCodec;
pub use registry::ResourceRegistry;
pub use reporter::ResourceReporter;
pub use server::ResourceServer;
