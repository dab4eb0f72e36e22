pub mod bundle_builder;
pub mod coordinator;
pub mod engine;
pub mod gas_pricer;
pub mod market_analyzer;
pub mod performance_tracker;
pub mod risk_manager;
pub mod slippage;
pub mod validator;

pub use bundle_builder::BundleBuilder;
pub use coordinator::OptimizationCoordinator;
pub use engine::{EngineStatus, OptimizerEngine};
pub use gas_pricer::GasPricer;
pub use market_analyzer::MarketAnalyzer;
pub use performance_tracker::PerformanceTracker;
pub use risk_manager::RiskManager;
pub use slippage::SlippageCalculator;
pub use validator::ParameterValidator;
