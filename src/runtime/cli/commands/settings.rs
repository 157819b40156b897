use crate::runtime::cli::{CliError, ConfigCommand, Context};

pub fn run(ctx: &Context, command: ConfigCommand) -> Result<(), CliError> {
    match command {
        ConfigCommand::Show => {
            let shown = ctx.settings.redacted();
            if ctx.json {
                println!("{}", serde_json::to_string_pretty(&shown)?);
            } else {
                print!("{}", toml::to_string_pretty(&shown)?);
                println!("# effective api_base_url = {}", ctx.settings.api_base_url());
            }
        }
        ConfigCommand::Path => println!("{}", ctx.config_path.display()),
        ConfigCommand::Set { key, value } => {
            let mut settings = ctx.settings.clone();
            settings.set(&key, &value)?;
            settings.save_to(&ctx.config_path)?;
            log::info!("Saved {key} to {}", ctx.config_path.display());
            if !ctx.json {
                println!("Updated {key}.");
            }
        }
    }
    Ok(())
}
