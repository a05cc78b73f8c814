use std::{fmt, str::FromStr};

use serde_with::{DeserializeFromStr, SerializeDisplay};

use crate::{error::Error, names::ElementName};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PathSegment {
    /// `..`: the scope enclosing the current one.
    Parent,
    Name(ElementName),
}

/// Target of a reference attribute, e.g. `Counter`, `../Clock` or `/Group/Exported`.
///
/// Paths are normalized on construction: `.` segments are dropped and `name/..` pairs fold
/// away, so two paths compare equal iff they address the same element from the same scope.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct ElementPath {
    absolute: bool,
    segments: Vec<PathSegment>,
}

impl ElementPath {
    pub fn parse(input: &str) -> Result<Self, Error> {
        let invalid = |message: &str| Error::InvalidPath {
            input: input.to_string(),
            message: message.to_string(),
        };

        if input.is_empty() {
            return Err(invalid("path is empty"));
        }

        let (absolute, rest) = match input.strip_prefix('/') {
            Some(rest) => (true, rest),
            None => (false, input),
        };

        let mut segments = Vec::new();
        for raw in rest.split('/') {
            match raw {
                "" => return Err(invalid("empty path segment")),
                "." => {}
                ".." => match segments.last() {
                    Some(PathSegment::Name(_)) => {
                        segments.pop();
                    }
                    _ if absolute => return Err(invalid("`..` escapes the root registry")),
                    _ => segments.push(PathSegment::Parent),
                },
                name => segments.push(PathSegment::Name(ElementName::new(name)?)),
            }
        }

        if !matches!(segments.last(), Some(PathSegment::Name(_))) {
            return Err(invalid("path must end in an element name"));
        }

        Ok(Self { absolute, segments })
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// The element a plain sibling reference names, if this is one.
    pub fn as_sibling(&self) -> Option<&ElementName> {
        match (self.absolute, self.segments.as_slice()) {
            (false, [PathSegment::Name(name)]) => Some(name),
            _ => None,
        }
    }

    /// Final element name of the path.
    pub fn target(&self) -> &ElementName {
        match self.segments.last() {
            Some(PathSegment::Name(name)) => name,
            _ => unreachable!("element paths always end in a name"),
        }
    }
}

impl From<ElementName> for ElementPath {
    fn from(name: ElementName) -> Self {
        Self {
            absolute: false,
            segments: vec![PathSegment::Name(name)],
        }
    }
}

impl FromStr for ElementPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ElementPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.absolute {
            f.write_str("/")?;
        }
        for (idx, segment) in self.segments.iter().enumerate() {
            if idx > 0 {
                f.write_str("/")?;
            }
            match segment {
                PathSegment::Parent => f.write_str("..")?,
                PathSegment::Name(name) => f.write_str(name.as_str())?,
            }
        }
        Ok(())
    }
}

/// Location of a node in a (possibly nested) registry tree, from the root registry down.
#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    DeserializeFromStr,
    SerializeDisplay,
)]
pub struct ComponentAddress(Vec<ElementName>);

impl ComponentAddress {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn child(&self, name: ElementName) -> Self {
        let mut segments = self.0.clone();
        segments.push(name);
        Self(segments)
    }

    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.0.split_last()?;
        Some(Self(rest.to_vec()))
    }

    pub fn name(&self) -> Option<&ElementName> {
        self.0.last()
    }

    pub fn segments(&self) -> &[ElementName] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

impl FromIterator<ElementName> for ComponentAddress {
    fn from_iter<T: IntoIterator<Item = ElementName>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl FromStr for ComponentAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "/" {
            return Ok(Self::root());
        }
        let path = ElementPath::parse(s)?;
        if !path.is_absolute() {
            return Err(Error::InvalidPath {
                input: s.to_string(),
                message: "component addresses are absolute".to_string(),
            });
        }
        path.segments
            .into_iter()
            .map(|segment| match segment {
                PathSegment::Name(name) => Ok(name),
                PathSegment::Parent => Err(Error::InvalidPath {
                    input: s.to_string(),
                    message: "component addresses cannot contain `..`".to_string(),
                }),
            })
            .collect()
    }
}

impl fmt::Display for ComponentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for name in &self.0 {
            f.write_str("/")?;
            f.write_str(name.as_str())?;
        }
        Ok(())
    }
}
