pub mod agent;
pub mod error;
pub mod manager;
pub mod static_agent;

pub mod test_support;

pub use agent::Agent;
pub use error::{AgentError, RegistrationError};
pub use manager::{AgentManager, AgentPerformance, ManagerStatus, MANAGER_SENDER};
pub use static_agent::StaticAgent;
