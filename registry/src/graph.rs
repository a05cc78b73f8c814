use std::collections::VecDeque;

use crate::{ComponentAddress, ElementName, ElementPath, PathSegment, Registry};

#[derive(Clone, Debug, thiserror::Error)]
#[error("registry contains a reference cycle: {}", display_cycle(.cycle))]
pub struct CycleError {
    pub cycle: Vec<ElementName>,
}

fn display_cycle(cycle: &[ElementName]) -> String {
    cycle
        .iter()
        .map(ElementName::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Reference that cannot reach an element from where it is written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DanglingReference {
    pub element: ComponentAddress,
    pub attribute: String,
    pub path: ElementPath,
}

/// Topologically sort the elements of one registry by sibling references:
/// if A references B, B comes before A.
///
/// Notes:
/// - Only plain sibling references participate; `..`, absolute and composite-crossing paths
///   leave this scope and are ignored here.
/// - References to missing elements are ignored (see [`dangling_references`]).
/// - Self-references are kept: an element referencing itself is a cycle.
pub fn topo_order(registry: &Registry) -> Result<Vec<ElementName>, CycleError> {
    let names: Vec<&ElementName> = registry.element_names().collect();
    let index_of = |name: &ElementName| names.binary_search(&name).ok();

    let n = names.len();
    let mut indeg = vec![0usize; n];
    let mut out: Vec<Vec<usize>> = vec![Vec::new(); n];

    for (v, (_, element)) in registry.elements().enumerate() {
        for value in element.attributes.values() {
            for path in value.references() {
                let Some(u) = path.as_sibling().and_then(index_of) else {
                    continue;
                };
                out[u].push(v);
            }
        }
    }

    for out in &mut out {
        out.sort_unstable();
        out.dedup();
        for &v in out.iter() {
            indeg[v] += 1;
        }
    }

    let mut q: VecDeque<usize> = (0..n).filter(|&i| indeg[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(u) = q.pop_front() {
        order.push(names[u].clone());
        for &v in &out[u] {
            indeg[v] -= 1;
            if indeg[v] == 0 {
                q.push_back(v);
            }
        }
    }

    if order.len() == n {
        return Ok(order);
    }

    let cycle = find_cycle(&out, &indeg)
        .into_iter()
        .map(|i| names[i].clone())
        .collect();
    Err(CycleError { cycle })
}

fn find_cycle(out: &[Vec<usize>], indeg: &[usize]) -> Vec<usize> {
    let n = out.len();
    let mut state = vec![0u8; n];
    let mut stack = Vec::new();

    fn dfs(
        u: usize,
        out: &[Vec<usize>],
        indeg: &[usize],
        state: &mut [u8],
        stack: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        state[u] = 1;
        stack.push(u);

        for &v in &out[u] {
            if indeg[v] == 0 {
                continue;
            }
            match state[v] {
                0 => {
                    if let Some(cycle) = dfs(v, out, indeg, state, stack) {
                        return Some(cycle);
                    }
                }
                1 => {
                    let start = stack.iter().position(|&node| node == v)?;
                    let mut cycle = stack[start..].to_vec();
                    cycle.push(v);
                    return Some(cycle);
                }
                _ => {}
            }
        }

        stack.pop();
        state[u] = 2;
        None
    }

    for u in 0..n {
        if indeg[u] == 0 || state[u] != 0 {
            continue;
        }
        if let Some(cycle) = dfs(u, out, indeg, &mut state, &mut stack) {
            return cycle;
        }
    }

    Vec::new()
}

/// Every reference in `registry` (and its embedded sub-registries) that cannot be followed
/// to an element.
///
/// Paths that continue through an element without an embedded registry are not reported:
/// such an element may still be a composite component type known only at resolution time.
pub fn dangling_references(registry: &Registry) -> Vec<DanglingReference> {
    let mut out = Vec::new();
    let mut scopes = vec![registry];
    collect_dangling(&mut scopes, &ComponentAddress::root(), &mut out);
    out
}

fn collect_dangling<'a>(
    scopes: &mut Vec<&'a Registry>,
    prefix: &ComponentAddress,
    out: &mut Vec<DanglingReference>,
) {
    let Some(&current) = scopes.last() else {
        return;
    };

    for (name, element) in current.elements() {
        let address = prefix.child(name.clone());
        for (attribute, value) in &element.attributes {
            for path in value.references() {
                if !reaches(scopes, path) {
                    out.push(DanglingReference {
                        element: address.clone(),
                        attribute: attribute.clone(),
                        path: path.clone(),
                    });
                }
            }
        }

        if let Some(sub) = element.sub_registry.as_deref() {
            scopes.push(sub);
            collect_dangling(scopes, &address, out);
            scopes.pop();
        }
    }
}

fn reaches(scopes: &[&Registry], path: &ElementPath) -> bool {
    let mut depth = if path.is_absolute() { 1 } else { scopes.len() };
    let mut segments = path.segments().iter().peekable();

    // Normalized paths only carry `..` as a prefix.
    while let Some(PathSegment::Parent) = segments.peek() {
        if depth <= 1 {
            return false;
        }
        depth -= 1;
        segments.next();
    }

    let mut names = segments.map(|segment| match segment {
        PathSegment::Name(name) => Some(name),
        PathSegment::Parent => None,
    });
    let Some(Some(first)) = names.next() else {
        return false;
    };
    let Some(mut element) = scopes[depth - 1].element(first.as_str()) else {
        return false;
    };

    for next in names {
        let Some(next) = next else {
            return false;
        };
        let Some(sub) = element.sub_registry.as_deref() else {
            return true;
        };
        let Some(found) = sub
            .exported_components()
            .get(next.as_str())
            .and_then(|inner| sub.element(inner.as_str()))
        else {
            return false;
        };
        element = found;
    }
    true
}
