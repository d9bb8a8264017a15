use clap::{Parser, Subcommand};
use std::error::Error;

use droid_login::config::{self, AdbSettings};
use droid_login::device::{AdbDevice, Device};
use droid_login::{Credentials, classify, execute, logging, otp};

/// droid-login - Drive an app's login screens and classify the result
#[derive(Parser, Debug)]
#[command(
    name = "droid-login",
    about = "Drive an Android app's login flow through an accessibility snapshot and classify the result",
    after_help = "ENVIRONMENT VARIABLES:\n\
        DROID_LOGIN_ADB                  adb binary\n\
        DROID_LOGIN_SERIAL               Device serial or host:port\n\
        DROID_LOGIN_PORTAL_AUTHORITY     Accessibility portal authority\n\
        DROID_LOGIN_SETTLE_SECS          Delay after screen-changing taps\n\
        DROID_LOGIN_FINAL_SETTLE_SECS    Delay before final classification\n\
        DROID_LOGIN_RUN_DEADLINE_SECS    Overall run deadline (0 = none)\n\
        DROID_LOGIN_LAYOUT               Layout overrides, e.g. username=4,password=5"
)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one login attempt and print the outcome
    Run {
        /// Package id of the app to log into
        #[arg(short, long, env = "DROID_LOGIN_PACKAGE")]
        package: String,

        /// Account identifier
        #[arg(short, long, env = "DROID_LOGIN_IDENTIFIER")]
        identifier: String,

        /// Account password
        #[arg(long, env = "DROID_LOGIN_PASSPHRASE", hide_env_values = true)]
        passphrase: String,

        /// Base32 shared secret for one-time codes
        #[arg(long, env = "DROID_LOGIN_OTP_SECRET", hide_env_values = true)]
        otp_secret: String,

        /// Device serial (overrides DROID_LOGIN_SERIAL)
        #[arg(short, long)]
        serial: Option<String>,

        /// Output the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the current one-time code for a shared secret
    Otp {
        #[arg(short, long, env = "DROID_LOGIN_OTP_SECRET", hide_env_values = true)]
        secret: String,
    },

    /// Classify a piece of screen text
    Classify {
        text: String,
    },

    /// Dump the device's current accessibility snapshot
    Snapshot {
        /// Device serial (overrides DROID_LOGIN_SERIAL)
        #[arg(short, long)]
        serial: Option<String>,

        /// Output the full snapshot as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    logging::init();
    let args = Args::parse();
    let cfg = config::get();

    match args.command {
        Some(Commands::Run {
            package,
            identifier,
            passphrase,
            otp_secret,
            serial,
            json,
        }) => {
            let device = AdbDevice::new(adb_settings(&cfg.adb, serial));
            let credentials = Credentials::new(identifier, passphrase, otp_secret, package);

            let report = execute(&device, &credentials, &cfg.engine).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.outcome);
            }
        }

        Some(Commands::Otp { secret }) => {
            let code = otp::generate(&secret);
            if code.is_empty() {
                return Err("shared secret is not valid base32".into());
            }
            println!("{}", code);
        }

        Some(Commands::Classify { text }) => {
            println!("{}", classify(&text));
        }

        Some(Commands::Snapshot { serial, json }) => {
            let device = AdbDevice::new(adb_settings(&cfg.adb, serial));
            device.connect().await?;
            let snapshot = device.snapshot().await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                print!("{}", snapshot.formatted_text);
                println!("({} clickable elements)", snapshot.clickable.len());
            }
        }

        None => {
            println!("droid-login - Drive an app's login flow and classify the result");
            println!();
            println!("Usage: droid-login <COMMAND>");
            println!();
            println!("Commands:");
            println!("  run       Run one login attempt and print the outcome");
            println!("  otp       Print the current one-time code for a secret");
            println!("  classify  Classify a piece of screen text");
            println!("  snapshot  Dump the device's current accessibility snapshot");
            println!();
            println!("Run with --help for more information.");
        }
    }

    Ok(())
}

fn adb_settings(base: &AdbSettings, serial: Option<String>) -> AdbSettings {
    let mut settings = base.clone();
    if serial.is_some() {
        settings.serial = serial;
    }
    settings
}
