//! Root places offered to the operator (drives, filesystem root, home).

use std::path::PathBuf;

/// Source of the top-level places a panel can jump to.
pub trait PlacesProvider {
    /// Root places, in display order.
    fn roots(&self) -> Vec<PathBuf>;
}

/// Places of the local machine.
///
/// On Windows every existing drive letter `A:\` to `Z:\`; elsewhere `/`
/// followed by the user's home directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalPlaces;

impl PlacesProvider for LocalPlaces {
    #[cfg(windows)]
    fn roots(&self) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = (b'A'..=b'Z')
            .map(|letter| PathBuf::from(format!("{}:\\", letter as char)))
            .filter(|drive| drive.exists())
            .collect();
        if let Some(home) = dirs::home_dir() {
            roots.push(home);
        }
        roots
    }

    #[cfg(not(windows))]
    fn roots(&self) -> Vec<PathBuf> {
        let mut roots = vec![PathBuf::from("/")];
        if let Some(home) = dirs::home_dir() {
            if home != roots[0] {
                roots.push(home);
            }
        }
        roots
    }
}

/// A fixed list of places, for hosts that know their roots up front.
#[derive(Debug, Clone, Default)]
pub struct StaticPlaces(pub Vec<PathBuf>);

impl PlacesProvider for StaticPlaces {
    fn roots(&self) -> Vec<PathBuf> {
        self.0.clone()
    }
}
