//! Identity subcommand handlers.

use devlink_core::{DeviceCode, IdentityStore};

use super::{identity_store, load_settings};
use crate::cli::{GlobalOpts, IdentityArgs, IdentityCommand};
use crate::error::CliError;

pub fn handle(args: IdentityArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = load_settings(global)?;
    let store = identity_store(&cfg);

    match args.command {
        IdentityCommand::Show => {
            let code = store.get().ok_or(CliError::NoIdentity)?;
            println!("{code}");
            Ok(())
        }

        IdentityCommand::Set { code } => {
            let code = DeviceCode::parse(&code)?;
            store.set(&code)?;
            eprintln!("✓ Device code set to {code}");
            eprintln!("  Stored in {}", store.dir().display());
            Ok(())
        }
    }
}
