pub mod render;
pub mod state;

pub use render::{CliFlavor, render, render_ios, render_nxos_json};
pub use state::{SimError, SimVlan, SwitchState, load_state, load_states, states_path};
