//! Mock fitting backend.
//!
//! Answers the NAL-NL2 function set with zero-filled arrays of the right
//! length, validates required parameters, and keeps the client profile
//! written by the setter functions. Used when no vendor engine is linked.

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::envelope::{FitRequest, FitResponse};
use crate::serial::FittingBackend;

/// Third-octave bands reported by most gain functions.
pub const BANDS: usize = 19;
/// Band count reported by the `*9` variants.
pub const BANDS_9: usize = 9;
/// Length of the centre frequency table.
pub const CENTRE_FREQUENCIES: usize = 18;
/// Points on an input/output curve.
pub const CURVE_POINTS: usize = 100;

const RECD_PARAMS: &[&str] = &["RECDmeasType", "dateOfBirth", "aidType", "tubing", "coupler", "fittingDepth"];
const GAIN_PARAMS: &[&str] = &["AC", "BC", "L", "limiting", "channels", "direction", "mic", "ACother", "noOfAids"];
const COUPLER_PARAMS: &[&str] = &[
    "AC", "BC", "L", "limiting", "channels", "direction", "mic", "target", "aidType", "ACother",
    "noOfAids", "tubing", "vent", "RECDmeasType",
];
const CURVE_PARAMS: &[&str] = &[
    "AC", "BC", "graphFreq", "startLevel", "finishLevel", "limiting", "channels", "direction", "mic",
    "target", "ACother", "noOfAids",
];

/// Shape of a function's `output_parameters`.
#[derive(Clone, Copy, Debug)]
enum Output {
    /// `{ key: [0; len] }`
    Array(&'static str, usize),
    /// `{ key: [0; len], "lineType": [0; len] }`
    WithLineType(&'static str, usize),
    /// A pair of unlimited/limited input-output curves.
    Curve(&'static str, &'static str),
    /// `{ key: 0.0 }`
    Scalar(&'static str),
    /// `{ "success": true }`
    Ack,
}

/// Profile fields written by the setter functions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Profile {
    pub adult_child: Option<i64>,
    pub date_of_birth: Option<i64>,
    pub experience: Option<i64>,
    pub comp_speed: Option<i64>,
    pub tonal: Option<i64>,
    pub gender: Option<i64>,
    pub bwc_channels: Option<i64>,
}

/// Zero-output fitting backend.
#[derive(Debug, Default)]
pub struct MockFitting {
    profile: Profile,
}

impl MockFitting {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current profile as written by the setter functions.
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Handle a parsed request, returning the response envelope.
    pub fn call(&mut self, request: &FitRequest) -> FitResponse {
        match self.dispatch(request) {
            Ok(output) => FitResponse::success(request.sequence_num, &request.function, output),
            Err(message) => FitResponse::failure(request.sequence_num, &request.function, message),
        }
    }

    fn dispatch(&mut self, req: &FitRequest) -> Result<Value, String> {
        let output = match req.function.as_str() {
            "dllVersion" => return Ok(json!({ "major": 1, "minor": 0 })),
            "SetAdultChild" => {
                self.require(req, &["adultChild", "dateOfBirth"])?;
                self.profile.adult_child = int_param(req, "adultChild");
                self.profile.date_of_birth = int_param(req, "dateOfBirth");
                Output::Ack
            }
            "SetExperience" => {
                self.require(req, &["experience"])?;
                self.profile.experience = int_param(req, "experience");
                Output::Ack
            }
            "SetCompSpeed" => {
                self.require(req, &["compSpeed"])?;
                self.profile.comp_speed = int_param(req, "compSpeed");
                Output::Ack
            }
            "SetTonalLanguage" => {
                self.require(req, &["tonal"])?;
                self.profile.tonal = int_param(req, "tonal");
                Output::Ack
            }
            "SetGender" => {
                self.require(req, &["gender"])?;
                self.profile.gender = int_param(req, "gender");
                Output::Ack
            }
            "setBWC" => {
                self.require(req, &["channels", "crossOver", "bandwidth", "selection"])?;
                self.profile.bwc_channels = int_param(req, "channels");
                Output::Ack
            }
            other => {
                let (required, output) = query_function(other)
                    .ok_or_else(|| format!("unknown function: {other}"))?;
                self.require(req, required)?;
                output
            }
        };
        Ok(render(output))
    }

    #[allow(clippy::unused_self)]
    fn require(&self, req: &FitRequest, fields: &[&str]) -> Result<(), String> {
        req.require(fields).map_err(|e| e.to_string())
    }
}

impl FittingBackend for MockFitting {
    fn process(&mut self, payload: &str) -> Result<String, String> {
        let request = FitRequest::parse(payload).map_err(|e| e.to_string())?;
        debug!(function = %request.function, sequence_num = request.sequence_num, "mock fitting call");
        let response = self.call(&request);
        serde_json::to_string(&response).map_err(|e| e.to_string())
    }
}

/// Required parameters and output shape of each read-only function.
fn query_function(name: &str) -> Option<(&'static [&'static str], Output)> {
    let entry: (&'static [&'static str], Output) = match name {
        "CrossOverFrequencies_NL2" => (&["channels", "AC", "BC"], Output::Array("crossOverFreq", BANDS)),
        "CenterFrequencies" => (&["channels", "CFArray"], Output::Array("centerFreq", CENTRE_FREQUENCIES)),
        "CompressionThreshold_NL2" => (
            &["WBCT", "aidType", "direction", "mic", "calcCh"],
            Output::Array("CT", BANDS),
        ),
        "GetRECDh_indiv_NL2" => (RECD_PARAMS, Output::Array("RECDh", BANDS)),
        "GetRECDh_indiv9_NL2" => (RECD_PARAMS, Output::Array("RECDh", BANDS_9)),
        "GetRECDt_indiv_NL2" => (RECD_PARAMS, Output::Array("RECDt", BANDS)),
        "GetRECDt_indiv9_NL2" => (RECD_PARAMS, Output::Array("RECDt", BANDS_9)),
        "SetRECDh_indiv_NL2" | "SetRECDh_indiv9_NL2" => (&["RECDh"], Output::Ack),
        "SetRECDt_indiv_NL2" | "SetRECDt_indiv9_NL2" => (&["RECDt"], Output::Ack),
        "CompressionRatio_NL2" => (
            &["CR", "channels", "centerFreq", "AC", "BC", "direction", "mic", "limiting", "ACother", "noOfAids"],
            Output::Array("CR", BANDS),
        ),
        "getMPO_NL2" => (
            &["type", "AC", "BC", "channels", "limiting", "ACother", "direction", "mic", "noOfAids"],
            Output::Array("MPO", BANDS),
        ),
        "RealEarAidedGain_NL2" => (GAIN_PARAMS, Output::Array("REAG", BANDS)),
        "RealEarInsertionGain_NL2" => (GAIN_PARAMS, Output::Array("REIG", BANDS)),
        "TccCouplerGain_NL2" => (COUPLER_PARAMS, Output::WithLineType("TccGain", BANDS)),
        "EarSimulatorGain_NL2" => (COUPLER_PARAMS, Output::WithLineType("ESG", BANDS)),
        "RealEarInputOutputCurve_NL2" => (CURVE_PARAMS, Output::Curve("REIO", "REIOunl")),
        "TccInputOutputCurve_NL2" => (CURVE_PARAMS, Output::Curve("TccIO", "TccIOunl")),
        "EarSimulatorInputOutputCurve_NL2" => (CURVE_PARAMS, Output::Curve("ESIO", "ESIOunl")),
        "AidedThreshold_NL2" => (
            &["AC", "BC", "CT", "dbOption", "ACother", "noOfAids", "limiting", "channels", "direction", "mic"],
            Output::Array("AT", BANDS),
        ),
        "GetREDDindiv" => (&["defValues"], Output::Array("REDD", BANDS)),
        "GetREDDindiv9" => (&["defValues"], Output::Array("REDD", BANDS_9)),
        "GetREURindiv" => (&["defValues", "dateOfBirth", "direction", "mic"], Output::Array("REUR", BANDS)),
        "GetREURindiv9" => (&["defValues", "dateOfBirth", "direction", "mic"], Output::Array("REUR", BANDS_9)),
        "SetREDDindiv" | "SetREDDindiv9" => (&["REDD", "defValues"], Output::Ack),
        "SetREURindiv" | "SetREURindiv9" => (
            &["REUR", "defValues", "dateOfBirth", "direction", "mic"],
            Output::Ack,
        ),
        "GetMLE" => (&["aidType", "direction", "mic"], Output::Array("MLE", BANDS)),
        "GetTubing_NL2" => (&["tubing"], Output::Array("Tubing", BANDS)),
        "GetTubing9_NL2" => (&["tubing"], Output::Array("Tubing", BANDS_9)),
        "GetVentOut_NL2" => (&["vent"], Output::Array("VentOut", BANDS)),
        "GetVentOut9_NL2" => (&["vent"], Output::Array("VentOut", BANDS_9)),
        "Get_SI_NL2" => (&["s", "REAG", "Limit"], Output::Scalar("SI")),
        "Get_SII" => (
            &["nCompSpeed", "Speech_thresh", "s", "REAG", "REAGp", "REAGm", "REUR"],
            Output::Scalar("SII"),
        ),
        _ => return None,
    };
    Some(entry)
}

fn render(output: Output) -> Value {
    let zeros = |len: usize| Value::from(vec![0.0_f64; len]);
    let mut map = Map::new();
    match output {
        Output::Array(key, len) => {
            let _ = map.insert(key.into(), zeros(len));
        }
        Output::WithLineType(key, len) => {
            let _ = map.insert(key.into(), zeros(len));
            let _ = map.insert("lineType".into(), Value::from(vec![0_i64; len]));
        }
        Output::Curve(limited, unlimited) => {
            let _ = map.insert(limited.into(), zeros(CURVE_POINTS));
            let _ = map.insert(unlimited.into(), zeros(CURVE_POINTS));
        }
        Output::Scalar(key) => {
            let _ = map.insert(key.into(), Value::from(0.0));
        }
        Output::Ack => {
            let _ = map.insert("success".into(), Value::Bool(true));
        }
    }
    Value::Object(map)
}

fn int_param(req: &FitRequest, key: &str) -> Option<i64> {
    req.input_parameters.get(key).and_then(Value::as_i64)
}
