//! Beam discovery and ICESat-2 strong/weak classification

use crate::core::schema::ProductSchema;
use crate::io::source::HierarchicalSource;
use crate::types::{Beam, BeamSelection, BeamStrength, OrbitOrientation};
use std::collections::HashSet;

/// Lazily yield the schema's beams that are present in the granule.
///
/// Presence is decided from the root group listing; absent beam groups are
/// skipped silently since a granule may carry any subset.
pub fn enumerate<'a>(
    source: &'a dyn HierarchicalSource,
    schema: &'a ProductSchema,
) -> impl Iterator<Item = Beam> + 'a {
    let root_groups: Option<HashSet<String>> = match source.list_groups("") {
        Ok(groups) => Some(groups.into_iter().collect()),
        Err(e) => {
            log::debug!("Cannot list groups of {}, probing beams one by one: {}", source.describe(), e);
            None
        }
    };

    schema
        .beam_names
        .iter()
        .filter(move |name| {
            let present = match &root_groups {
                Some(groups) => groups.contains(**name),
                None => source.contains(name),
            };
            if !present {
                log::debug!("Beam {} not present in {}", name, source.describe());
            }
            present
        })
        .map(|name| Beam::new(*name))
}

/// Strong/weak identity of an ICESat-2 ground track for the given orientation.
///
/// Ground tracks come in left/right pairs (gt1l/gt1r, ...). In backward
/// orientation the left beam of each pair is strong, in forward orientation
/// the right one. During a yaw flip (transition) strength is undefined.
pub fn classify(beam_name: &str, orientation: OrbitOrientation) -> Option<BeamStrength> {
    let side = match beam_name.strip_prefix("gt")?.as_bytes() {
        [pair, side] if (b'1'..=b'3').contains(pair) => *side,
        _ => return None,
    };

    let strong_side = match orientation {
        OrbitOrientation::Backward => b'l',
        OrbitOrientation::Forward => b'r',
        OrbitOrientation::Transition => return None,
    };

    match side {
        b'l' | b'r' if side == strong_side => Some(BeamStrength::Strong),
        b'l' | b'r' => Some(BeamStrength::Weak),
        _ => None,
    }
}

/// Whether a classified beam passes the requested selection
pub fn is_selected(beam: &Beam, selection: BeamSelection) -> bool {
    match selection {
        BeamSelection::All => true,
        BeamSelection::StrongOnly => beam.strength == Some(BeamStrength::Strong),
        BeamSelection::WeakOnly => beam.strength == Some(BeamStrength::Weak),
    }
}
