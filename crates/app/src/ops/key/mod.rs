use clap::{Args, Subcommand};

pub mod add;
pub mod check;
pub mod default;
pub mod list;
pub mod show;

use crate::op::Op;

crate::command_enum! {
    (Add, add::Add),
    (List, list::List),
    (Show, show::Show),
    (Default, default::SetDefault),
    (Check, check::Check),
}

pub type KeyCommand = Command;

#[derive(Args, Debug, Clone)]
pub struct Key {
    #[command(subcommand)]
    pub command: KeyCommand,
}

#[async_trait::async_trait]
impl Op for Key {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}
