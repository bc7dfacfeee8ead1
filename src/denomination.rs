//! Colombian peso banknote denominations

use std::fmt;

/// Colour used for labels that are not a recognised denomination
pub const UNKNOWN_COLOR: [u8; 3] = [255, 255, 255];

/// The seven banknote face values the model is trained on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Denomination {
    Mil,
    DosMil,
    CincoMil,
    DiezMil,
    VeinteMil,
    CincuentaMil,
    CienMil,
}

impl Denomination {
    /// All denominations in ascending value
    pub const ALL: [Denomination; 7] = [
        Denomination::Mil,
        Denomination::DosMil,
        Denomination::CincoMil,
        Denomination::DiezMil,
        Denomination::VeinteMil,
        Denomination::CincuentaMil,
        Denomination::CienMil,
    ];

    /// Exact match against the model label, e.g. `"20000"`
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.label() == label)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Denomination::Mil => "1000",
            Denomination::DosMil => "2000",
            Denomination::CincoMil => "5000",
            Denomination::DiezMil => "10000",
            Denomination::VeinteMil => "20000",
            Denomination::CincuentaMil => "50000",
            Denomination::CienMil => "100000",
        }
    }

    /// Face value in pesos
    pub fn value(&self) -> u64 {
        match self {
            Denomination::Mil => 1_000,
            Denomination::DosMil => 2_000,
            Denomination::CincoMil => 5_000,
            Denomination::DiezMil => 10_000,
            Denomination::VeinteMil => 20_000,
            Denomination::CincuentaMil => 50_000,
            Denomination::CienMil => 100_000,
        }
    }

    /// Overlay colour (RGB)
    pub fn color(&self) -> [u8; 3] {
        match self {
            Denomination::Mil => [0, 0, 255],
            Denomination::DosMil => [255, 0, 255],
            Denomination::CincoMil => [255, 255, 0],
            Denomination::DiezMil => [0, 255, 0],
            Denomination::VeinteMil => [255, 165, 0],
            Denomination::CincuentaMil => [128, 0, 128],
            Denomination::CienMil => [255, 0, 0],
        }
    }

    /// Default class table, used when neither the config nor the model names the classes
    pub fn default_class_names() -> Vec<String> {
        Self::ALL.iter().map(|d| d.label().to_string()).collect()
    }
}

impl fmt::Display for Denomination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${} COP", format_cop(self.value()))
    }
}

/// Colour for an arbitrary label
pub fn color_for(label: &str) -> [u8; 3] {
    Denomination::from_label(label)
        .map(|d| d.color())
        .unwrap_or(UNKNOWN_COLOR)
}

/// Sum of face values over the labels that are Colombian denominations
pub fn total_value<'a, I>(labels: I) -> u64
where
    I: IntoIterator<Item = &'a str>,
{
    labels
        .into_iter()
        .filter_map(Denomination::from_label)
        .map(|d| d.value())
        .sum()
}

/// Amount with thousands separators: `170000` -> `170,000`
pub fn format_cop(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Message returned with each detection by the API
pub fn message_for(label: &str, is_colombian: bool) -> String {
    if is_colombian {
        format!("Billete colombiano de ${} COP", label)
    } else {
        format!("Billete no colombiano o desconocido: {}", label)
    }
}

/// Shorter message drawn in the camera window
pub fn live_message_for(label: &str, is_colombian: bool) -> String {
    if is_colombian {
        format!("Billete colombiano: {}", label)
    } else {
        format!("Detectado: {}", label)
    }
}
