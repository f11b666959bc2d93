pub mod http;
pub mod kv;

pub use self::http::{HttpError, HttpRequest, HttpResponse, HttpResult};
pub use self::kv::{KeyNamespace, KvError, KvKey};

// We use Crux's built-in Render capability directly because it provides
// all necessary functionality for triggering view updates.
pub use crux_core::render::Render;

use crate::app::{App, Event};

pub type AppHttp = crux_http::Http<Event>;
pub type AppKv = crux_kv::KeyValue<Event>;
pub type AppRender = Render<Event>;

// The `Effect` derive names each enum variant after the last path segment of
// the field's type. A generic alias lets the `kv` field keep the `Kv` variant
// name (rather than `KeyValue`) while resolving to the same capability type.
type Http<Ev> = crux_http::Http<Ev>;
type Kv<Ev> = crux_kv::KeyValue<Ev>;

#[derive(crux_core::macros::Effect)]
pub struct Capabilities {
    pub http: Http<Event>,
    pub kv: Kv<Event>,
    pub render: Render<Event>,
}
