use super::{BomError, Descriptor, OutputBom};
use crate::device::Ident;
use crate::refdes::Refdes;

/// What changes between two configurations of the same board: the items to add and the
/// items to remove when reworking a `start` build into an `end` build.
#[derive(Debug, Clone)]
pub struct DeltaOutputBom {
    pub descriptor: Descriptor,
    additions: OutputBom,
    subtractions: OutputBom,
}

impl DeltaOutputBom {
    /// Compare `start` with `end`; `reverse` swaps the direction of the rework.
    pub fn new(start: &OutputBom, end: &OutputBom, reverse: bool) -> Result<Self, BomError> {
        let (start, end) = if reverse { (end, start) } else { (start, end) };
        let descriptor = Descriptor::new(format!(
            "{} -> {}",
            start.descriptor.config_name, end.descriptor.config_name
        ))
        .with_multiplier(end.descriptor.multiplier);

        let mut additions = OutputBom::new(descriptor.clone()).with_wire_slack(*end.wire_slack());
        for (ident, refdes) in changed_items(start, end) {
            additions.insert_item(ident, refdes)?;
        }
        let mut subtractions =
            OutputBom::new(descriptor.clone()).with_wire_slack(*start.wire_slack());
        for (ident, refdes) in changed_items(end, start) {
            subtractions.insert_item(ident, refdes)?;
        }

        log::debug!(
            "{}: {} lines added, {} lines removed",
            descriptor.config_name,
            additions.len(),
            subtractions.len()
        );
        Ok(Self {
            descriptor,
            additions,
            subtractions,
        })
    }

    pub fn additions(&self) -> &OutputBom {
        &self.additions
    }

    pub fn subtractions(&self) -> &OutputBom {
        &self.subtractions
    }

    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.subtractions.is_empty()
    }
}

/// Items of `target` whose refdes is missing from `original` or carries another ident.
fn changed_items(original: &OutputBom, target: &OutputBom) -> Vec<(Ident, Refdes)> {
    target
        .items()
        .filter(|(ident, refdes)| original.item_for_refdes(refdes) != Some(*ident))
        .map(|(ident, refdes)| (ident.clone(), refdes.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bom(name: &str, items: &[(&str, &str)]) -> OutputBom {
        let mut bom = OutputBom::new(Descriptor::new(name));
        for (refdes, ident) in items {
            bom.insert_item(Ident::parse(ident).unwrap(), refdes.parse().unwrap())
                .unwrap();
        }
        bom
    }

    fn refs(bom: &OutputBom) -> Vec<String> {
        bom.items().map(|(i, r)| format!("{r}={i}")).collect()
    }

    #[test]
    fn additions_and_subtractions() {
        let start = bom(
            "basic",
            &[
                ("R1", "RES SMD 10K 0402"),
                ("R2", "RES SMD 10K 0402"),
                ("C1", "CAP CER SMD 1nF 0402"),
            ],
        );
        let end = bom(
            "full",
            &[
                ("R1", "RES SMD 10K 0402"),
                ("R2", "RES SMD 4.7K 0402"),
                ("R3", "RES SMD 1K 0402"),
            ],
        );

        let delta = DeltaOutputBom::new(&start, &end, false).unwrap();
        assert_eq!(delta.descriptor.config_name, "basic -> full");
        assert_eq!(
            refs(delta.additions()),
            vec!["R3=RES SMD 1K 0402", "R2=RES SMD 4.7K 0402"]
        );
        assert_eq!(
            refs(delta.subtractions()),
            vec!["C1=CAP CER SMD 1nF 0402", "R2=RES SMD 10K 0402"]
        );

        let back = DeltaOutputBom::new(&start, &end, true).unwrap();
        assert_eq!(back.descriptor.config_name, "full -> basic");
        assert_eq!(refs(back.additions()), refs(delta.subtractions()));
    }

    #[test]
    fn identical_boms_have_no_delta() {
        let a = bom("a", &[("R1", "RES SMD 10K 0402")]);
        let b = bom("b", &[("R1", "RES SMD 10K 0402")]);
        assert!(DeltaOutputBom::new(&a, &b, false).unwrap().is_empty());
    }
}
