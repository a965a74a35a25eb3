use std::process::ExitCode;

use meta_flow::Role;

#[tokio::main]
async fn main() -> ExitCode {
    median_node::node_main(Role::Evaluator).await
}
