//! Bank support agent backed by a fake customer database

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use agentry_agent::{
    Agent, FunctionTool, PromptError, ResultSchema, ReturnType, RunContext, ToolArgs, ToolOutcome,
};
use agentry_config::Config;
use agentry_provider::Provider;

pub const DEMO_QUERIES: [&str; 2] = ["What is my balance?", "I just lost my card!"];

const SYSTEM_PROMPT: &str = "You are a support agent in our bank, give the customer support \
and judge the risk level of their query. Reply using the customer's name.";

/// Stand-in for a real customer database
#[derive(Debug, Default, Clone, Copy)]
pub struct DatabaseConn;

impl DatabaseConn {
    pub async fn customer_name(&self, id: u32) -> Option<&'static str> {
        match id {
            1 => Some("John"),
            2 => Some("Trump"),
            3 => Some("Praveen"),
            4 => Some("Lucky"),
            _ => None,
        }
    }

    pub async fn customer_balance(&self, id: u32) -> Option<f64> {
        match id {
            1 => Some(100.0),
            2 => Some(123.45),
            3 => Some(342.0),
            4 => Some(10.0),
            _ => None,
        }
    }
}

pub struct SupportDependencies {
    pub customer_id: u32,
    pub db: DatabaseConn,
}

impl SupportDependencies {
    pub fn new(customer_id: u32) -> Self {
        Self {
            customer_id,
            db: DatabaseConn,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SupportResult {
    pub support_advice: String,
    pub block_card: bool,
    pub risk: u8,
}

impl fmt::Display for SupportResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Advice:     {}", self.support_advice)?;
        writeln!(f, "Block card: {}", if self.block_card { "yes" } else { "no" })?;
        write!(f, "Risk:       {}/10", self.risk)
    }
}

pub fn result_schema() -> agentry_agent::Result<ResultSchema> {
    let schema = ResultSchema::builder("SupportResult")
        .string("support_advice", "Advice returned to the customer")
        .boolean("block_card", "Whether to block their card or not")
        .int_range("risk", "Risk level of query", 0, 10)
        .build()?;
    Ok(schema)
}

fn customer_balance() -> FunctionTool<SupportDependencies> {
    FunctionTool::builder("customer_balance", "Returns the customer's current account balance.")
        .bool_arg("include_pending", "Whether to include pending transactions")
        .returns(ReturnType::Text)
        .handler(|ctx: RunContext<SupportDependencies>, args: ToolArgs| async move {
            let deps = ctx.deps();
            debug!(
                customer_id = deps.customer_id,
                include_pending = args.bool_or("include_pending", true),
                "looking up balance"
            );
            match deps.db.customer_balance(deps.customer_id).await {
                Some(balance) => ToolOutcome::text(format!("${:.2}", balance)),
                None => ToolOutcome::Error(format!(
                    "Customer not found with the given id :- {}",
                    deps.customer_id
                )),
            }
        })
}

pub fn support_agent(
    provider: Arc<dyn Provider>,
    config: &Config,
) -> agentry_agent::Result<Agent<SupportDependencies>> {
    super::configured(provider, config)
        .system_prompt(SYSTEM_PROMPT)
        .dynamic_prompt(
            "add_customer_name",
            |ctx: RunContext<SupportDependencies>| async move {
                let id = ctx.deps().customer_id;
                match ctx.deps().db.customer_name(id).await {
                    Some(name) => Ok(format!("The customer's name is {:?}", name)),
                    None => Err(PromptError::NotFound(format!("customer with id {}", id))),
                }
            },
        )
        .tool(customer_balance())
        .result_schema(result_schema()?)
        .build()
}
