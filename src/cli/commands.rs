// ============================================================
// Layer 1: CLI Commands and Arguments
// ============================================================
// Defines the subcommands and all their configurable flags:
//
//   anchors       - print the anchor layout of a configuration
//   propose       - decode proposals from a tensor dump
//   assign        - compute anchor targets from a tensor dump
//   check-config  - load + validate a configuration file
//   init-config   - write the default configuration
//   probe         - run the network on a synthetic image
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, u64, GtBox, ...)
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::application::probe_use_case::ProbeRequest;
use crate::domain::boxes::{BBox, GtBox};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the base anchors (and grid anchor count) for a configuration
    Anchors(AnchorsArgs),

    /// Decode text proposals from a JSON tensor dump
    Propose(ProposeArgs),

    /// Assign anchor labels and regression targets from a JSON tensor dump
    Assign(AssignArgs),

    /// Load and validate a configuration file
    CheckConfig,

    /// Write the default configuration as JSON
    InitConfig(InitConfigArgs),

    /// Run the full network on a synthetic image
    Probe(ProbeArgs),
}

#[derive(Args, Debug)]
pub struct AnchorsArgs {
    /// Feature map height in cells
    #[arg(long, requires = "width")]
    pub height: Option<usize>,

    /// Feature map width in cells
    #[arg(long, requires = "height")]
    pub width: Option<usize>,
}

impl AnchorsArgs {
    pub fn grid(&self) -> Option<[usize; 2]> {
        self.height.zip(self.width).map(|(h, w)| [h, w])
    }
}

#[derive(Args, Debug)]
pub struct ProposeArgs {
    /// Tensor dump with im_info, cls_prob and bbox_pred
    #[arg(long)]
    pub input: PathBuf,

    /// Write the report here instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct AssignArgs {
    /// Tensor dump with im_info, cls_prob (used for its shape) and gt_boxes
    #[arg(long)]
    pub input: PathBuf,

    /// Seed for positive / negative subsampling
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Write the report here instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct InitConfigArgs {
    /// Where to write the configuration
    #[arg(long, default_value = "ctpn.json")]
    pub path: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Image height in pixels
    #[arg(long, default_value_t = 64)]
    pub height: usize,

    /// Image width in pixels
    #[arg(long, default_value_t = 96)]
    pub width: usize,

    /// Seed for the synthetic image and anchor subsampling
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Ground-truth box "x1,y1,x2,y2"; repeat for several boxes.
    /// Without any, no loss is computed.
    #[arg(long = "gt", value_parser = parse_gt_box)]
    pub gt_boxes: Vec<GtBox>,

    /// Write the head outputs as a tensor dump
    #[arg(long)]
    pub dump: Option<PathBuf>,
}

/// Convert CLI ProbeArgs into the application-layer request.
impl From<&ProbeArgs> for ProbeRequest {
    fn from(a: &ProbeArgs) -> Self {
        ProbeRequest {
            height:   a.height,
            width:    a.width,
            seed:     a.seed,
            gt_boxes: a.gt_boxes.clone(),
            dump:     a.dump.clone(),
        }
    }
}

/// Parse "x1,y1,x2,y2" into a text-class ground-truth box.
pub fn parse_gt_box(s: &str) -> Result<GtBox, String> {
    let values = s
        .split(',')
        .map(|v| v.trim().parse::<f32>().map_err(|e| format!("'{v}': {e}")))
        .collect::<Result<Vec<_>, _>>()?;

    match values.as_slice() {
        &[x1, y1, x2, y2] => {
            let bbox = BBox::new(x1, y1, x2, y2);
            if bbox.is_degenerate() {
                return Err(format!("box '{s}' has no area"));
            }
            Ok(GtBox::new(bbox, 1))
        }
        _ => Err(format!("expected x1,y1,x2,y2, got '{s}'")),
    }
}
