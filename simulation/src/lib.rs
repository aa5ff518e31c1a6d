//! # payroute simulation
//!
//! A deterministic discrete-event harness for payment-channel-aware route
//! discovery. It plays the two collaborators the protocol crates leave
//! abstract: the virtual-time scheduler and the lossy broadcast medium.
//!
//! - **Topology** (`topology.rs`): who is in radio range of whom
//! - **Simulation** (`simulation.rs`): the event queue and the per-node
//!   [`Runtime`](payroute_core::Runtime) each handler runs against
//! - **Scenarios** (`scenarios.rs`): canned runs, used by the CLI and tests
//!
//! ## Example: A pays C through B
//!
//! ```rust,ignore
//! use payroute_simulation::*;
//!
//! let mesh = from_edges(&[('A', 'B'), ('B', 'C')])?;
//! let mut sim = Simulation::new(mesh, scenarios::funded_channels_config());
//! sim.open_channel(a, 15, b, 15)?;
//! sim.open_channel(b, 20, c, 20)?;
//! sim.start_all()?;
//!
//! sim.pay(a, c, 10)?;
//! sim.run();
//!
//! assert_eq!(sim.channel(a, b).unwrap().my_available, 5);
//! ```

pub mod error;
pub mod scenarios;
pub mod simulation;
pub mod topology;

pub use error::{SimError, SimResult};
pub use simulation::{ChannelView, SimConfig, SimEvent, SimStats, Simulation};
pub use topology::{Mesh, MeshBuilder, NodeId, from_edges};

pub use payroute_core::SimulationIdentity;
