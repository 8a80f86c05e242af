//! Shared fixtures for agent integration tests
#![allow(dead_code)]

use std::sync::Arc;

use agentry_agent::{
    Agent, FunctionTool, PromptError, ResultSchema, ReturnType, RunContext, ToolArgs, ToolOutcome,
};
use agentry_provider::{Conversation, Provider, Role};

/// Toy bank: customer id -> (name, balance)
pub struct SupportDeps {
    pub customer_id: u32,
    pub customers: Vec<(u32, &'static str, f64)>,
}

impl SupportDeps {
    pub fn new(customer_id: u32) -> Self {
        Self {
            customer_id,
            customers: vec![(123, "John", 100.0), (7, "Ada", 42.5)],
        }
    }

    pub fn name(&self) -> Option<&'static str> {
        self.customers
            .iter()
            .find(|(id, _, _)| *id == self.customer_id)
            .map(|(_, name, _)| *name)
    }

    pub fn balance(&self) -> Option<f64> {
        self.customers
            .iter()
            .find(|(id, _, _)| *id == self.customer_id)
            .map(|(_, _, balance)| *balance)
    }
}

pub fn support_schema() -> ResultSchema {
    ResultSchema::builder("SupportResult")
        .string("support_advice", "Advice returned to the customer")
        .boolean("block_card", "Whether to block their card")
        .int_range("risk", "Risk level of query", 0, 10)
        .build()
        .expect("support schema is coherent")
}

pub fn lookup_balance() -> FunctionTool<SupportDeps> {
    FunctionTool::builder("lookup_balance", "Returns the customer's current account balance.")
        .bool_arg("include_pending", "Include pending transactions")
        .returns(ReturnType::Text)
        .handler(|ctx: RunContext<SupportDeps>, _args: ToolArgs| async move {
            match ctx.deps().balance() {
                Some(balance) => ToolOutcome::text(format!("${:.2}", balance)),
                None => ToolOutcome::Error(format!(
                    "Customer not found with the given id :- {}",
                    ctx.deps().customer_id
                )),
            }
        })
}

pub fn support_agent(provider: Arc<dyn Provider>, max_retries: u32) -> Agent<SupportDeps> {
    Agent::builder(provider)
        .system_prompt(
            "You are a support agent in our bank, give the customer support and judge the risk level of their query.",
        )
        .dynamic_prompt("add_customer_name", |ctx: RunContext<SupportDeps>| async move {
            ctx.deps()
                .name()
                .map(|name| format!("The customer's name is {:?}", name))
                .ok_or_else(|| {
                    PromptError::NotFound(format!(
                        "customer with id {}",
                        ctx.deps().customer_id
                    ))
                })
        })
        .tool(lookup_balance())
        .result_schema(support_schema())
        .max_retries(max_retries)
        .build()
        .expect("support agent builds")
}

/// Contents of tool-result messages, in order
pub fn tool_results(conversation: &Conversation) -> Vec<(String, String)> {
    conversation
        .by_role(Role::Tool)
        .map(|m| (m.name.clone().unwrap_or_default(), m.text().to_string()))
        .collect()
}
