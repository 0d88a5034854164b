use sea_orm_migration::prelude::*;

#[tokio::main]
async fn main() {
    cli::run_cli(verimail_verification_migration::Migrator).await;
}
