/// Colour semantics attached to a severity class.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Tone {
    Emerald,
    Yellow,
    Orange,
    Red,
    DarkRed,
}

#[derive(Debug, PartialEq, Eq)]
pub struct SeverityClass {
    pub index: usize,
    /// Identifier used by the model, eg `No_DR`.
    pub identifier: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub tone: Tone,
}

pub const CLASS_COUNT: usize = 5;

pub static SEVERITY_CLASSES: [SeverityClass; CLASS_COUNT] = [
    SeverityClass {
        index: 0,
        identifier: "No_DR",
        label: "No DR",
        description: "No signs of diabetic retinopathy detected. The retina appears healthy.",
        tone: Tone::Emerald,
    },
    SeverityClass {
        index: 1,
        identifier: "Mild",
        label: "Mild",
        description:
            "Early stage with microaneurysms. A routine eye examination every 12 months is recommended.",
        tone: Tone::Yellow,
    },
    SeverityClass {
        index: 2,
        identifier: "Moderate",
        label: "Moderate",
        description:
            "Intermediate stage. Requires closer monitoring and a consultation with an ophthalmologist.",
        tone: Tone::Orange,
    },
    SeverityClass {
        index: 3,
        identifier: "Severe",
        label: "Severe",
        description:
            "Advanced stage. Consult a retina specialist as soon as possible for treatment.",
        tone: Tone::Red,
    },
    SeverityClass {
        index: 4,
        identifier: "Proliferate_DR",
        label: "Proliferate DR",
        description:
            "Most severe stage. Requires immediate medical treatment to prevent vision loss.",
        tone: Tone::DarkRed,
    },
];

pub fn severity_class(index: usize) -> Option<&'static SeverityClass> {
    SEVERITY_CLASSES.get(index)
}

pub fn by_identifier(identifier: &str) -> Option<&'static SeverityClass> {
    SEVERITY_CLASSES
        .iter()
        .find(|class| class.identifier == identifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_ordered_by_index() {
        for (position, class) in SEVERITY_CLASSES.iter().enumerate() {
            assert_eq!(class.index, position);
        }
    }

    #[test]
    fn lookup_by_index() {
        assert_eq!(severity_class(0).unwrap().label, "No DR");
        assert_eq!(severity_class(4).unwrap().label, "Proliferate DR");
        assert!(severity_class(5).is_none());
    }

    #[test]
    fn lookup_by_identifier() {
        assert_eq!(by_identifier("Proliferate_DR").unwrap().index, 4);
        assert!(by_identifier("proliferate_dr").is_none());
    }
}
