mod resolve_query;

pub use resolve_query::{shared_resolv_conf, ResolveQueryUseCase};
