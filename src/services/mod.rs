// utags-store services
// Services sit at the edges of the store: the webapp sync bridge, the host
// availability probe behind it, and the read-only settings engine.

pub mod availability;
pub mod settings_engine;
pub mod sync_adapter;
