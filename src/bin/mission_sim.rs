//! Runs a complete mission against the simulated robot: localize from an
//! unknown start, drive to a goal tile with line-crossing drift correction
//! and optionally run a retrieval in the pickup zone.

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use gridnav_core::behaviors::{PickupSequence, RetrievalBehavior};
use gridnav_core::common::{tile_to_metric, Direction, Pose, TileCoord};
use gridnav_core::config::NavConfig;
use gridnav_core::control::Drive;
use gridnav_core::perception::drift_correction::{DriftCorrector, LineSide};
use gridnav_core::sim::{SimLineSensor, SimProximitySensor, SimWorld, SimulatedDrive};
use gridnav_core::NavigationCore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Simulated grid navigation mission.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Mission configuration (TOML)
    #[arg(short, long, default_value = "config/mission.toml")]
    config: PathBuf,

    /// True starting tile, unknown to the robot
    #[arg(long, num_args = 2, value_names = ["X", "Y"], default_values_t = [3, 3])]
    start: Vec<i32>,

    /// True starting direction, unknown to the robot
    #[arg(long, value_enum, default_value_t = Facing::Left)]
    facing: Facing,

    /// Goal tile
    #[arg(long, num_args = 2, value_names = ["X", "Y"], default_values_t = [0, 0])]
    goal: Vec<i32>,

    /// Heading to face at the goal, degrees
    #[arg(long, allow_hyphen_values = true)]
    goal_heading: Option<f64>,

    /// True distance covered per commanded millimetre
    #[arg(long, default_value_t = 1.02)]
    travel_scale: f64,

    /// True rotation per commanded degree
    #[arg(long, default_value_t = 1.0)]
    rotate_scale: f64,

    /// Simulated time per motion step
    #[arg(long, default_value_t = 5)]
    step_delay_ms: u64,

    /// Status readout period
    #[arg(long, default_value_t = 1000)]
    status_ms: u64,

    /// Run a retrieval in the pickup zone after reaching the goal
    #[arg(long, default_value_t = false)]
    pickup: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Facing {
    Up,
    Down,
    Left,
    Right,
}

impl From<Facing> for Direction {
    fn from(facing: Facing) -> Self {
        match facing {
            Facing::Up => Direction::Up,
            Facing::Down => Direction::Down,
            Facing::Left => Direction::Left,
            Facing::Right => Direction::Right,
        }
    }
}

/// Drives half a tile into the zone and back out
struct ForwardReach {
    reach_mm: f64,
}

impl RetrievalBehavior for ForwardReach {
    fn name(&self) -> &str {
        "forward reach"
    }

    fn retrieve(&mut self, drive: &dyn Drive) -> gridnav_core::Result<()> {
        drive.travel(self.reach_mm)?;
        drive.travel(-self.reach_mm)
    }
}

fn run_mission(
    core: &mut NavigationCore,
    cli: &Cli,
    world: &Arc<SimWorld>,
    drive: Arc<SimulatedDrive>,
) -> anyhow::Result<()> {
    let tile_width = core.config().grid.tile_width_mm;
    let proximity = SimProximitySensor::new(
        Arc::clone(world),
        core.config().localization.proximity_max_range_mm,
    );

    if let Some(corrector) = core.drift_corrector() {
        corrector.enable();
    }

    let mut localizer = core
        .localizer(drive.clone(), Box::new(proximity))
        .context("building localizer")?;
    let observations = localizer.localize().context("localization")?;
    let estimate = core.pose_store().get();
    info!(
        "localized with {} observations: estimate {} (truth {})",
        observations,
        estimate,
        world.true_pose()
    );
    if estimate.tile(tile_width) != world.true_tile() {
        bail!(
            "localized to {} but the robot is on {}",
            estimate.tile(tile_width),
            world.true_tile()
        );
    }

    let mut mover = core.movement_controller(drive).context("building movement controller")?;
    if mover.navigation().map().read()?.pickup_zone().is_some() {
        // Keep routes out of the pickup zone until a retrieval needs it
        mover.navigation().block_pickup_zone()?;
        mover.navigation_mut().regenerate()?;
    }

    mover
        .travel_to_tile(cli.goal[0], cli.goal[1], cli.goal_heading)
        .with_context(|| format!("travelling to ({}, {})", cli.goal[0], cli.goal[1]))?;

    if cli.pickup {
        let zone = mover.navigation().map().read()?.pickup_zone();
        match zone {
            Some([entry, _]) => {
                let exit = mover.current_tile();
                let mut reach = ForwardReach {
                    reach_mm: tile_width / 2.0,
                };
                PickupSequence::new(entry, exit)
                    .run(&mut mover, &mut reach)
                    .context("pickup")?;
            }
            None => warn!("--pickup given but the map has no pickup zone"),
        }
    }

    let truth = world.true_pose();
    let estimate = core.pose_store().get();
    info!(
        "mission complete: estimate {}, truth {}, error {:.1} mm",
        estimate,
        truth,
        estimate.distance_to(&truth)
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gridnav_core=info".parse()?)
                .add_directive("mission_sim=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        info!("Loading configuration from {:?}", cli.config);
        NavConfig::load(&cli.config)?
    } else {
        bail!("configuration file {:?} not found", cli.config);
    };
    let tile_width = config.grid.tile_width_mm;
    let correction = config.correction.clone();

    let mut core = NavigationCore::from_config(config)?;

    let facing = Direction::from(cli.facing);
    let start_tile = TileCoord::new(cli.start[0], cli.start[1]);
    if core.map().read()?.blocked(start_tile) {
        bail!("start tile {} is blocked", start_tile);
    }
    let start = Pose::new(
        tile_to_metric(start_tile.x, tile_width),
        tile_to_metric(start_tile.y, tile_width),
        facing.heading_degrees(),
    );
    info!("true start {} facing {}", start_tile, facing.as_cardinal());

    let world = SimWorld::new(core.map().snapshot()?, tile_width, start);
    let drive = Arc::new(
        SimulatedDrive::new(Arc::clone(&world), Arc::clone(core.pose_store()))
            .with_scale_error(cli.travel_scale, cli.rotate_scale)
            .with_step_delay(Duration::from_millis(cli.step_delay_ms)),
    );

    core.register(DriftCorrector::new(
        Box::new(SimLineSensor::new(Arc::clone(&world), LineSide::Left, &correction)),
        Box::new(SimLineSensor::new(Arc::clone(&world), LineSide::Right, &correction)),
        Arc::clone(core.pose_store()),
        &correction,
        tile_width,
    ));
    core.init()?;

    // Independent read-only status readout
    let status = {
        let store = Arc::clone(core.pose_store());
        let world = Arc::clone(&world);
        let period = Duration::from_millis(cli.status_ms.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let estimate = store.get();
                info!(
                    "status: estimate {} ({}), truth {}",
                    estimate,
                    estimate.tile(tile_width),
                    world.true_pose()
                );
            }
        })
    };

    let mission = tokio::task::spawn_blocking(move || {
        let result = run_mission(&mut core, &cli, &world, drive);
        (core, result)
    });

    tokio::select! {
        joined = mission => {
            status.abort();
            let (mut core, result) = joined?;
            core.shutdown()?;
            if let Err(e) = &result {
                error!("mission failed: {:#}", e);
            }
            result
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, aborting mission");
            std::process::exit(130);
        }
    }
}
