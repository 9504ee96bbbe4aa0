//! Tower middleware making up the [`ForgeClient`](crate::ForgeClient) stack.
mod bearer;
mod forge_headers;
mod forge_uri;

pub use bearer::{Bearer, BearerLayer};
pub use forge_headers::{ForgeHeaders, ForgeHeadersLayer};
pub use forge_uri::{ForgeUri, ForgeUriLayer};

pub(crate) use forge_uri::GRAPHQL;
