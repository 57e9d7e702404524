//! Command-line front-end: one subcommand per operator view.

use crate::api::ApiClient;
use crate::camera;
use crate::config::Config;
use crate::display;
use crate::error::{Error, Result};
use crate::feed::{self, FeedFilter, FeedUpdate, LiveEvents, FEED_CAPACITY};
use crate::plate::PlateNumber;
use crate::report;
use crate::session::Session;
use crate::types::{NewLogEntry, NewVehicle, PlateStatus};
use clap::{Parser, Subcommand};
use chrono::FixedOffset;
use log::{error, info, warn};
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::thread;
use tokio::sync::mpsc;
use tokio::task;

/// Operator console for the plate recognition service.
#[derive(Debug, Parser)]
#[command(name = "plate-console", version)]
pub struct Cli {
    /// Base URL of the service's HTTP API (overrides PLATE_API_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub api_url: Option<String>,

    /// Detection push channel (overrides PLATE_WS_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub ws_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in and print a token to export as PLATE_TOKEN
    Login {
        username: String,
        /// Defaults to PLATE_PASSWORD
        #[arg(long)]
        password: Option<String>,
    },

    /// Follow live detections until interrupted
    Watch {
        /// Only list registered vehicles
        #[arg(long)]
        registered_only: bool,
    },

    /// Check a plate manually
    Check { plate: String },

    /// Manage registered vehicles
    #[command(subcommand)]
    Vehicles(VehicleCommand),

    /// Browse or clear the detection log
    #[command(subcommand)]
    Logs(LogCommand),

    /// Daily registered/unregistered counts
    Report,

    /// Control the camera stream
    #[command(subcommand)]
    Camera(CameraCommand),
}

#[derive(Debug, Subcommand)]
pub enum VehicleCommand {
    List,
    Show {
        plate: String,
    },
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        plate: String,
        #[arg(long)]
        purpose: Option<String>,
        /// Photo URL or path known to the service
        #[arg(long)]
        photo: Option<String>,
    },
    /// Change the name, purpose or photo of a vehicle
    Update {
        plate: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        purpose: Option<String>,
        #[arg(long)]
        photo: Option<String>,
    },
    Remove {
        plate: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum LogCommand {
    List,
    Add {
        plate: String,
        #[arg(long, value_parser = parse_status, default_value = "unregistered")]
        status: PlateStatus,
        #[arg(long)]
        vehicle_id: Option<i64>,
    },
    /// Delete every log entry
    Clear {
        /// Required; clearing cannot be undone
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum CameraCommand {
    Stop,
    /// Save one frame of the camera stream as a JPEG
    Snapshot {
        /// Defaults to PLATE_SNAPSHOT_DIR
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,
    },
}

fn parse_status(s: &str) -> std::result::Result<PlateStatus, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "registered" => Ok(PlateStatus::Registered),
        "unregistered" => Ok(PlateStatus::Unregistered),
        _ => Err(format!("expected registered or unregistered, got {:?}", s)),
    }
}

pub async fn run(cli: Cli, mut config: Config) -> Result<()> {
    if let Some(url) = &cli.api_url {
        config.set_api_url(url)?;
    }
    if let Some(url) = &cli.ws_url {
        config.set_ws_url(url)?;
    }
    let console = Console {
        api: ApiClient::new(config.api_url.clone()),
        config,
    };
    console.dispatch(cli.command).await
}

struct Console {
    api: ApiClient,
    config: Config,
}

impl Console {
    async fn dispatch(&self, command: Command) -> Result<()> {
        match command {
            Command::Login { username, password } => self.login(&username, password).await,
            Command::Watch { registered_only } => {
                let filter = if registered_only {
                    FeedFilter::RegisteredOnly
                } else {
                    self.config.feed_filter
                };
                self.watch(filter).await
            }
            Command::Check { plate } => self.check(&plate).await,
            Command::Vehicles(command) => self.vehicles(command).await,
            Command::Logs(command) => self.logs(command).await,
            Command::Report => self.report().await,
            Command::Camera(command) => self.camera(command).await,
        }
    }

    /// Resolves the session from a stored token, or logs in with configured
    /// credentials.
    async fn session(&self) -> Result<Session> {
        if let Some(token) = &self.config.token {
            return Ok(Session::from_token(token.as_str()));
        }
        match (&self.config.username, &self.config.password) {
            (Some(username), Some(password)) => self.api.login(username, password).await,
            _ => Err(Error::NotAuthenticated),
        }
    }

    async fn login(&self, username: &str, password: Option<String>) -> Result<()> {
        let password = password
            .or_else(|| self.config.password.clone())
            .ok_or(Error::Config {
                key: "PLATE_PASSWORD",
                value: String::new(),
            })?;
        let session = self.api.login(username, &password).await?;
        println!("{}", session.token()?);
        Ok(())
    }

    /// Follows the feed. Lines typed while watching either select a row of
    /// the live list by number or run a manual check of a plate.
    async fn watch(&self, filter: FeedFilter) -> Result<()> {
        let offset = self.config.display_offset;
        // The dashboard is only shown to logged-in operators.
        let session = self.session().await?;
        let (handle, mut updates) =
            feed::spawn(self.config.ws_url.clone(), self.config.reconnect_delay);
        let mut live = LiveEvents::new(filter);
        let mut input = stdin_lines();
        let mut input_open = true;
        let ctrl_c = tokio::signal::ctrl_c();
        futures::pin_mut!(ctrl_c);
        loop {
            tokio::select! {
                update = updates.recv() => match update {
                    Some(FeedUpdate::State(state)) => {
                        live.apply(FeedUpdate::State(state));
                        println!("-- feed {}", state);
                    }
                    Some(update) => {
                        if live.apply(update) {
                            render(&live, &offset);
                        }
                    }
                    None => break,
                },
                line = input.recv(), if input_open => match line {
                    Some(line) => self.watch_input(&mut live, &session, &line).await,
                    None => input_open = false,
                },
                _ = &mut ctrl_c => {
                    info!("Interrupted, closing detection feed");
                    break;
                }
            }
        }
        handle.teardown().await;
        Ok(())
    }

    async fn watch_input(&self, live: &mut LiveEvents, session: &Session, line: &str) {
        let offset = self.config.display_offset;
        match parse_watch_input(line) {
            Ok(None) => {}
            Ok(Some(WatchInput::Select(row))) => {
                if live.select(row - 1).is_some() {
                    print!("{}", display::vehicle_panel(live.selected(), &offset));
                } else {
                    println!("No row {}", row);
                }
            }
            Ok(Some(WatchInput::Check(plate))) => {
                match self.api.check_plate(session, &plate).await {
                    Ok(event) => {
                        println!("{}", display::status_label(event.status));
                        live.push_manual(event);
                        render(live, &offset);
                    }
                    Err(e) => error!("Checking {} failed: {}", plate, e),
                }
            }
            Err(e) => println!("{}", e),
        }
    }

    async fn check(&self, plate: &str) -> Result<()> {
        let plate = PlateNumber::parse(plate)?;
        let session = self.session().await?;
        let event = self.api.check_plate(&session, &plate).await?;
        println!("{}", display::status_label(event.status));
        print!(
            "{}",
            display::vehicle_panel(Some(&event), &self.config.display_offset)
        );
        Ok(())
    }

    async fn vehicles(&self, command: VehicleCommand) -> Result<()> {
        let offset = self.config.display_offset;
        match command {
            VehicleCommand::List => {
                let session = self.session().await?;
                let vehicles = self.api.list_vehicles(&session).await?;
                print!("{}", display::vehicles_table(&vehicles, &offset));
            }
            VehicleCommand::Show { plate } => {
                let plate = PlateNumber::parse(&plate)?;
                let session = self.session().await?;
                let vehicle = self.api.get_vehicle(&session, &plate).await?;
                print!("{}", display::vehicle_details(&vehicle, &offset));
            }
            VehicleCommand::Add {
                name,
                plate,
                purpose,
                photo,
            } => {
                let plate = PlateNumber::parse(&plate)?;
                let session = self.session().await?;
                let vehicle = NewVehicle {
                    name,
                    plate_number: plate.into(),
                    purpose,
                    profile_picture: photo,
                };
                let record = self.api.create_vehicle(&session, &vehicle).await?;
                print!("{}", display::vehicle_details(&record, &offset));
            }
            VehicleCommand::Update {
                plate,
                name,
                purpose,
                photo,
            } => {
                let plate = PlateNumber::parse(&plate)?;
                let session = self.session().await?;
                let current = self.api.get_vehicle(&session, &plate).await?;
                let vehicle = NewVehicle {
                    name: name.unwrap_or(current.name),
                    plate_number: current.plate_number,
                    purpose: purpose.or(current.purpose),
                    profile_picture: photo.or(current.profile_picture),
                };
                let record = self.api.update_vehicle(&session, &plate, &vehicle).await?;
                print!("{}", display::vehicle_details(&record, &offset));
            }
            VehicleCommand::Remove { plate } => {
                let plate = PlateNumber::parse(&plate)?;
                let session = self.session().await?;
                self.api.delete_vehicle(&session, &plate).await?;
                println!("Removed {}", plate);
            }
        }
        Ok(())
    }

    async fn logs(&self, command: LogCommand) -> Result<()> {
        let offset = self.config.display_offset;
        match command {
            LogCommand::List => {
                let session = self.session().await?;
                let logs = self.api.list_logs(&session).await?;
                print!("{}", display::logs_table(&logs, &offset));
            }
            LogCommand::Add {
                plate,
                status,
                vehicle_id,
            } => {
                let plate = PlateNumber::parse(&plate)?;
                let session = self.session().await?;
                let entry = NewLogEntry {
                    plate_number: plate.into(),
                    status,
                    vehicle_id,
                };
                let log = self.api.create_log(&session, &entry).await?;
                print!("{}", display::logs_table(&[log], &offset));
            }
            LogCommand::Clear { yes } => {
                if !yes {
                    warn!("Refusing to clear the log without --yes");
                    println!("Pass --yes to delete every log entry.");
                    return Ok(());
                }
                let session = self.session().await?;
                self.api.clear_logs(&session).await?;
                println!("Log cleared.");
            }
        }
        Ok(())
    }

    async fn report(&self) -> Result<()> {
        let session = self.session().await?;
        let logs = self.api.list_logs(&session).await?;
        let days = report::daily_counts(&logs, self.config.display_offset);
        let totals = report::totals(&days);
        print!("{}", display::report_table(&days, &totals));
        Ok(())
    }

    async fn camera(&self, command: CameraCommand) -> Result<()> {
        let session = self.session().await?;
        match command {
            CameraCommand::Stop => {
                self.api.stop_camera(&session).await?;
                println!("Camera stopped.");
            }
            CameraCommand::Snapshot { out } => {
                let dir = out.unwrap_or_else(|| self.config.snapshot_dir.clone());
                let mut stream = self.api.video_feed(&session).await?;
                let frame = stream.first_frame().await?;
                let path = task::spawn_blocking(move || camera::save_snapshot(&frame, &dir))
                    .await
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))??;
                println!("{}", path.display());
            }
        }
        Ok(())
    }
}

/// Forwards stdin lines from a detached thread, so a pending read never holds
/// up shutdown.
fn stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Stopped reading input: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

fn render(live: &LiveEvents, offset: &FixedOffset) {
    print!("{}", display::live_updates(live, offset));
    print!("{}", display::vehicle_panel(live.selected(), offset));
}

/// A line typed while watching the feed.
#[derive(Debug, PartialEq)]
enum WatchInput {
    /// 1-based row of the live list.
    Select(usize),
    Check(PlateNumber),
}

fn parse_watch_input(line: &str) -> Result<Option<WatchInput>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    match line.parse::<usize>() {
        Ok(row) if row >= 1 && row <= FEED_CAPACITY => Ok(Some(WatchInput::Select(row))),
        _ => Ok(Some(WatchInput::Check(PlateNumber::parse(line)?))),
    }
}
