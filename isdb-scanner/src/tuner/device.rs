//! Tuner device enumeration.
//!
//! Known chardev driver device paths are probed directly. Each path maps to
//! a tuner model name and a band capability derived from the device number.

use std::path::{Path, PathBuf};

use log::warn;

/// Band capability of a tuner device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunerType {
    /// ISDB-T only
    Terrestrial,
    /// ISDB-S only
    Satellite,
    /// ISDB-T and ISDB-S
    Multi,
}

impl TunerType {
    /// Human-readable capability label used in tuner names and logs.
    pub fn label(&self) -> &'static str {
        match self {
            TunerType::Terrestrial => "Terrestrial",
            TunerType::Satellite => "Satellite",
            TunerType::Multi => "Multi",
        }
    }
}

/// A tuner character device recognized by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunerDevice {
    path: PathBuf,
    name: String,
    tuner_type: TunerType,
}

impl TunerDevice {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tuner_type(&self) -> TunerType {
        self.tuner_type
    }

    pub fn can_tune_terrestrial(&self) -> bool {
        matches!(self.tuner_type, TunerType::Terrestrial | TunerType::Multi)
    }

    pub fn can_tune_satellite(&self) -> bool {
        matches!(self.tuner_type, TunerType::Satellite | TunerType::Multi)
    }
}

// chardev 版ドライバにおけるチューナーデバイスのパス
// ref: https://github.com/tsukumijima/px4_drv
// ref: https://github.com/stz2012/recpt1/blob/master/recpt1/pt1_dev.h

/// ISDB-T 専用のチューナーデバイスのパス
/// Earthsoft PT1/PT2/PT3 と PLEX PX4/PX5 系は全体で最大8チューナー、
/// PLEX PX-S1UR は最大8台接続まで想定
const ISDBT_DEVICE_PATHS: &[&str] = &[
    // Earthsoft PT1 / PT2
    "/dev/pt1video2",
    "/dev/pt1video3",
    "/dev/pt1video6",
    "/dev/pt1video7",
    "/dev/pt1video10",
    "/dev/pt1video11",
    "/dev/pt1video14",
    "/dev/pt1video15",
    // Earthsoft PT3
    "/dev/pt3video2",
    "/dev/pt3video3",
    "/dev/pt3video6",
    "/dev/pt3video7",
    "/dev/pt3video10",
    "/dev/pt3video11",
    "/dev/pt3video14",
    "/dev/pt3video15",
    // PLEX PX-W3U4/PX-Q3U4/PX-W3PE4/PX-Q3PE4/PX-W3PE5/PX-Q3PE5
    "/dev/px4video2",
    "/dev/px4video3",
    "/dev/px4video6",
    "/dev/px4video7",
    "/dev/px4video10",
    "/dev/px4video11",
    "/dev/px4video14",
    "/dev/px4video15",
    // PLEX PX-S1UR
    "/dev/pxs1urvideo0",
    "/dev/pxs1urvideo1",
    "/dev/pxs1urvideo2",
    "/dev/pxs1urvideo3",
    "/dev/pxs1urvideo4",
    "/dev/pxs1urvideo5",
    "/dev/pxs1urvideo6",
    "/dev/pxs1urvideo7",
];

/// ISDB-S 専用のチューナーデバイスのパス
const ISDBS_DEVICE_PATHS: &[&str] = &[
    // Earthsoft PT1 / PT2
    "/dev/pt1video0",
    "/dev/pt1video1",
    "/dev/pt1video4",
    "/dev/pt1video5",
    "/dev/pt1video8",
    "/dev/pt1video9",
    "/dev/pt1video12",
    "/dev/pt1video13",
    // Earthsoft PT3
    "/dev/pt3video0",
    "/dev/pt3video1",
    "/dev/pt3video4",
    "/dev/pt3video5",
    "/dev/pt3video8",
    "/dev/pt3video9",
    "/dev/pt3video12",
    "/dev/pt3video13",
    // PLEX PX-W3U4/PX-Q3U4/PX-W3PE4/PX-Q3PE4/PX-W3PE5/PX-Q3PE5
    "/dev/px4video0",
    "/dev/px4video1",
    "/dev/px4video4",
    "/dev/px4video5",
    "/dev/px4video8",
    "/dev/px4video9",
    "/dev/px4video12",
    "/dev/px4video13",
];

/// ISDB-T/ISDB-S 共用のマルチチューナーデバイスのパス
/// PLEX PX-MLT5PE/PX-MLT8PE と e-better DTV02A-4TS-P はそれぞれ最大2台、
/// PLEX PX-M1UR と e-better DTV02A-1T1S-U はそれぞれ最大8台接続まで想定
const ISDB_MULTI_DEVICE_PATHS: &[&str] = &[
    // e-better DTV02A-4TS-P
    "/dev/isdb6014video0",
    "/dev/isdb6014video1",
    "/dev/isdb6014video2",
    "/dev/isdb6014video3",
    "/dev/isdb6014video4",
    "/dev/isdb6014video5",
    "/dev/isdb6014video6",
    "/dev/isdb6014video7",
    // PLEX PX-MLT5PE
    "/dev/pxmlt5video0",
    "/dev/pxmlt5video1",
    "/dev/pxmlt5video2",
    "/dev/pxmlt5video3",
    "/dev/pxmlt5video4",
    "/dev/pxmlt5video5",
    "/dev/pxmlt5video6",
    "/dev/pxmlt5video7",
    "/dev/pxmlt5video8",
    "/dev/pxmlt5video9",
    // PLEX PX-MLT8PE
    "/dev/pxmlt8video0",
    "/dev/pxmlt8video1",
    "/dev/pxmlt8video2",
    "/dev/pxmlt8video3",
    "/dev/pxmlt8video4",
    "/dev/pxmlt8video5",
    "/dev/pxmlt8video6",
    "/dev/pxmlt8video7",
    "/dev/pxmlt8video8",
    "/dev/pxmlt8video9",
    "/dev/pxmlt8video10",
    "/dev/pxmlt8video11",
    "/dev/pxmlt8video12",
    "/dev/pxmlt8video13",
    "/dev/pxmlt8video14",
    "/dev/pxmlt8video15",
    // e-better DTV02A-1T1S-U
    "/dev/isdb2056video0",
    "/dev/isdb2056video1",
    "/dev/isdb2056video2",
    "/dev/isdb2056video3",
    "/dev/isdb2056video4",
    "/dev/isdb2056video5",
    "/dev/isdb2056video6",
    "/dev/isdb2056video7",
    // PLEX PX-M1UR
    "/dev/pxm1urvideo0",
    "/dev/pxm1urvideo1",
    "/dev/pxm1urvideo2",
    "/dev/pxm1urvideo3",
    "/dev/pxm1urvideo4",
    "/dev/pxm1urvideo5",
    "/dev/pxm1urvideo6",
    "/dev/pxm1urvideo7",
];

/// Enumerate tuner devices for this scan run.
///
/// With no explicit paths, the known chardev paths are probed and every
/// existing character device is returned, dedicated T/S tuners before multi
/// tuners. Explicitly given paths are used as-is without an existence check
/// (open failures surface later as tuning errors); unrecognized paths are
/// skipped with a warning.
pub fn discover_tuners(explicit: &[PathBuf]) -> Vec<TunerDevice> {
    if !explicit.is_empty() {
        let mut tuners = Vec::new();
        for path in explicit {
            match classify_device(path) {
                Some((tuner_type, name)) => tuners.push(TunerDevice {
                    path: path.clone(),
                    name,
                    tuner_type,
                }),
                None => warn!("Unrecognized tuner device path: {}", path.display()),
            }
        }
        return tuners;
    }

    let mut tuners = Vec::new();
    for path_str in ISDBT_DEVICE_PATHS
        .iter()
        .chain(ISDBS_DEVICE_PATHS)
        .chain(ISDB_MULTI_DEVICE_PATHS)
    {
        let path = Path::new(path_str);
        if !is_char_device(path) {
            continue;
        }
        if let Some((tuner_type, name)) = classify_device(path) {
            tuners.push(TunerDevice {
                path: path.to_path_buf(),
                name,
                tuner_type,
            });
        }
    }
    tuners
}

fn is_char_device(path: &Path) -> bool {
    use std::os::unix::fs::FileTypeExt;
    match std::fs::metadata(path) {
        Ok(metadata) => metadata.file_type().is_char_device(),
        Err(_) => false,
    }
}

/// Derive the tuner model name and band capability from a chardev path.
fn classify_device(path: &Path) -> Option<(TunerType, String)> {
    let path_str = path.to_string_lossy();

    if let Some(rest) = path_str.strip_prefix("/dev/pt1video") {
        let (tuner_type, ordinal) = pt_series_position(rest.parse().ok()?);
        let name = format!("Earthsoft PT1 / PT2 ({}) #{}", tuner_type.label(), ordinal);
        return Some((tuner_type, name));
    }
    if let Some(rest) = path_str.strip_prefix("/dev/pt3video") {
        let (tuner_type, ordinal) = pt_series_position(rest.parse().ok()?);
        let name = format!("Earthsoft PT3 ({}) #{}", tuner_type.label(), ordinal);
        return Some((tuner_type, name));
    }
    if let Some(rest) = path_str.strip_prefix("/dev/px4video") {
        let (tuner_type, ordinal) = pt_series_position(rest.parse().ok()?);
        let name = format!("PLEX PX4/PX5 Series ({}) #{}", tuner_type.label(), ordinal);
        return Some((tuner_type, name));
    }
    if let Some(rest) = path_str.strip_prefix("/dev/pxs1urvideo") {
        let device_number: u32 = rest.parse().ok()?;
        return Some((
            TunerType::Terrestrial,
            format!("PLEX PX-S1UR #{}", device_number + 1),
        ));
    }
    if let Some(rest) = path_str.strip_prefix("/dev/pxm1urvideo") {
        let device_number: u32 = rest.parse().ok()?;
        return Some((
            TunerType::Multi,
            format!("PLEX PX-M1UR #{}", device_number + 1),
        ));
    }
    if let Some(rest) = path_str.strip_prefix("/dev/pxmlt5video") {
        let device_number: u32 = rest.parse().ok()?;
        return Some((
            TunerType::Multi,
            format!("PLEX PX-MLT5PE #{}", device_number + 1),
        ));
    }
    if let Some(rest) = path_str.strip_prefix("/dev/pxmlt8video") {
        let device_number: u32 = rest.parse().ok()?;
        return Some((
            TunerType::Multi,
            format!("PLEX PX-MLT8PE #{}", device_number + 1),
        ));
    }
    if let Some(rest) = path_str.strip_prefix("/dev/isdb6014video") {
        let device_number: u32 = rest.parse().ok()?;
        return Some((
            TunerType::Multi,
            format!("e-better DTV02A-4TS-P #{}", device_number + 1),
        ));
    }
    if let Some(rest) = path_str.strip_prefix("/dev/isdb2056video") {
        let device_number: u32 = rest.parse().ok()?;
        return Some((
            TunerType::Multi,
            format!("e-better DTV02A-1T1S-U #{}", device_number + 1),
        ));
    }
    if let Some(rest) = path_str.strip_prefix("/dev/isdbt2071video") {
        let device_number: u32 = rest.parse().ok()?;
        return Some((
            TunerType::Terrestrial,
            format!("e-better DTV03A-1TU #{}", device_number + 1),
        ));
    }

    None
}

/// PT1/PT2/PT3/PX4 系のデバイス番号からチューナー種別と台数内の連番を求める
/// ISDB-S: 0,1,4,5,8,9,... / ISDB-T: 2,3,6,7,10,11,... (2個おき)
fn pt_series_position(device_number: u32) -> (TunerType, u32) {
    let remainder = device_number % 4;
    let (tuner_type, mut ordinal) = if remainder < 2 {
        (TunerType::Satellite, device_number / 4 * 2 + 1)
    } else {
        (TunerType::Terrestrial, (device_number - 2) / 4 * 2 + 1)
    };
    if remainder == 1 || remainder == 3 {
        ordinal += 1;
    }
    (tuner_type, ordinal)
}
