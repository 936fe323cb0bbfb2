//! AppStream component synthesis.
//!
//! Builds normalized `<component>` documents for a package, either by
//! cleaning up the metainfo files it ships or, failing that, by
//! synthesizing components from its `.desktop` files. Packaged icons
//! matching the component icon are collected for the repository icon
//! tarball.

use std::collections::BTreeMap;

use tracing::warn;

use crate::desktop::DesktopFile;
use crate::errors::MdError;
use crate::rpm::Rpm;
use crate::xml::{self, Element};

const METAINFO_DIRS: [&str; 2] = ["/usr/share/metainfo/", "/usr/share/appdata/"];
const APPLICATIONS_DIR: &str = "/usr/share/applications/";
const ICONS_DIR: &str = "/usr/share/icons/";
const PIXMAPS_PREFIX: &str = "/usr/share/pixmaps";

/// Components and icon payloads produced for one package.
#[derive(Debug, Default)]
pub struct AppstreamData {
    pub components: Vec<Element>,
    /// Icon payloads keyed `{size}/{icon}.{ext}` - the member names of
    /// the repository icon tarball.
    pub icons: BTreeMap<String, Vec<u8>>,
}

impl AppstreamData {
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

/// Produce the AppStream components for `rpm`. With `collect_icons`,
/// packaged icons referenced by the components are extracted too.
pub fn synthesize(rpm: &Rpm, collect_icons: bool) -> Result<AppstreamData, MdError> {
    let mut metainfo_files = Vec::new();
    let mut desktop_files = Vec::new();
    let mut icon_files = Vec::new();
    for file in rpm.file_list(false) {
        if METAINFO_DIRS.iter().any(|d| file.path.starts_with(d)) {
            metainfo_files.push(file.path);
        } else if file.path.starts_with(APPLICATIONS_DIR) {
            desktop_files.push(file.path);
        } else if file.path.starts_with(ICONS_DIR) || file.path.starts_with(PIXMAPS_PREFIX) {
            icon_files.push(file.path);
        }
    }

    let mut out = AppstreamData::default();
    if metainfo_files.is_empty() && desktop_files.is_empty() {
        return Ok(out);
    }

    // Desktop files are pulled even when metainfo exists - they
    // supplement icons and categories the metainfo forgot.
    let mut wanted = metainfo_files.clone();
    wanted.extend(desktop_files.iter().cloned());
    let payloads = rpm.extract_files(&wanted)?;

    if !metainfo_files.is_empty() {
        for path in &metainfo_files {
            let Some(content) = payloads.get(path) else {
                continue;
            };
            // Third-party data: only a real XML parser will do here.
            let root = match xml::parse(content) {
                Ok(root) => root,
                Err(e) => {
                    warn!("unparseable appstream metadata {path} in {}: {e}", rpm.path().display());
                    continue;
                }
            };
            if let Some(component) = normalize_component(
                root,
                path,
                rpm,
                &payloads,
                &desktop_files,
                &icon_files,
                collect_icons,
                &mut out.icons,
            )? {
                out.components.push(component);
            }
        }
    } else {
        for path in &desktop_files {
            let Some(content) = payloads.get(path) else {
                continue;
            };
            out.components.push(desktop_component(
                rpm,
                path,
                content,
                &icon_files,
                collect_icons,
                &mut out.icons,
            )?);
        }
    }
    Ok(out)
}

/// Normalize one metainfo document into a valid `<component>`, or
/// `None` when the document is beyond repair.
#[allow(clippy::too_many_arguments)]
fn normalize_component(
    mut root: Element,
    path: &str,
    rpm: &Rpm,
    payloads: &std::collections::HashMap<String, Vec<u8>>,
    desktop_files: &[String],
    icon_files: &[String],
    collect_icons: bool,
    icons: &mut BTreeMap<String, Vec<u8>>,
) -> Result<Option<Element>, MdError> {
    // Pre-AppStream metadata used <application> as the document element
    // (brasero, clementine, empathy vintage).
    if root.name == "application" {
        root.name = "component".to_string();
        root.set_attr("type", "desktop-application");
    }
    if root.name != "component" {
        warn!(
            "appstream metadata with document element \"{}\" rather than \"component\" found: {path} in {}",
            root.name,
            rpm.path().display()
        );
        return Ok(None);
    }
    // A forgotten type= is far more common than a legitimately untyped
    // metainfo file, and type="desktop" is a widespread spelling of
    // "desktop-application".
    if !root.has_attr("type") {
        root.set_attr("type", "desktop-application");
    }
    if root.attr("type") == Some("desktop") {
        root.set_attr("type", "desktop-application");
    }

    if root.child("id").is_none() {
        // No id - make one up from the filename. Both *.metainfo.xml
        // and *.appdata.xml are in circulation, strip either.
        let mut fake_id = basename(path);
        if let Some(stripped) = fake_id.strip_suffix(".metainfo.xml") {
            fake_id = stripped;
        }
        if let Some(stripped) = fake_id.strip_suffix(".appdata.xml") {
            fake_id = stripped;
        }
        root.insert_element(0, Element::with_text("id", fake_id));
    }
    let id_position = root.element_position("id").unwrap_or(0);
    if root.child("source_pkgname").is_none() {
        root.insert_element(
            id_position + 1,
            Element::with_text("source_pkgname", &rpm.source_package_name()),
        );
    }
    if root.child("pkgname").is_none() {
        root.insert_element(id_position + 1, Element::with_text("pkgname", rpm.name()));
    }
    // update_contact must not be exposed to end users; updatecontact is
    // a common misspelling of the same thing.
    root.remove_children("update_contact");
    root.remove_children("updatecontact");

    // Find the desktop file belonging to this component so it can
    // supplement forgotten icons and categories.
    let mut desktop_file: Option<String> = None;
    for launchable in root.children_named("launchable") {
        if launchable.attr("type") == Some("desktop-id") {
            let candidate = format!("{APPLICATIONS_DIR}{}", launchable.text());
            if desktop_files.contains(&candidate) {
                desktop_file = Some(candidate);
                break;
            }
            // No known cases, but forgetting to append .desktop to the
            // id seems too easy not to cover.
            let with_suffix = format!("{candidate}.desktop");
            if desktop_files.contains(&with_suffix) {
                desktop_file = Some(with_suffix);
                break;
            }
        }
    }
    if desktop_file.is_none() {
        // The desktop file *should* be referenced through launchable,
        // but frequently isn't. Some bogus appdata files (konsole,
        // falkon) already carry ".desktop" in the id.
        let id_text = root.child("id").map(|e| e.text()).unwrap_or_default();
        for candidate in [
            format!("{APPLICATIONS_DIR}{id_text}.desktop"),
            format!("{APPLICATIONS_DIR}{id_text}"),
            format!("{APPLICATIONS_DIR}{}.desktop", rpm.name()),
        ] {
            if desktop_files.contains(&candidate) {
                desktop_file = Some(candidate);
                break;
            }
        }
    }

    if let Some(desktop_path) = desktop_file {
        if root.child("launchable").is_none() {
            let mut launchable = Element::new("launchable");
            launchable.set_attr("type", "desktop-id");
            launchable.push_text(basename(&desktop_path));
            root.push_element(launchable);
        }
        if let Some(content) = payloads.get(&desktop_path) {
            let df = DesktopFile::parse(content);
            if root.child("icon").is_none() {
                if let Some(icon_name) = df.value("Icon") {
                    let mut stock = Element::new("icon");
                    stock.set_attr("type", "stock");
                    stock.push_text(icon_name);
                    root.push_element(stock);
                    if collect_icons {
                        for element in cached_icons(rpm, icon_files, icon_name, icons)? {
                            root.push_element(element);
                        }
                    }
                }
            }
            if root.child("categories").is_none() {
                if let Some(value) = df.value("Categories") {
                    root.push_element(categories_element(value));
                }
            }
        }
    }

    Ok(Some(root))
}

/// Synthesize a `<component type="desktop">` from a `.desktop` file, for
/// packages without any metainfo.
fn desktop_component(
    rpm: &Rpm,
    path: &str,
    content: &[u8],
    icon_files: &[String],
    collect_icons: bool,
    icons: &mut BTreeMap<String, Vec<u8>>,
) -> Result<Element, MdError> {
    let base = basename(path);
    let desktop_name = base.strip_suffix(".desktop").unwrap_or(base);
    // ids must not contain special characters; the launchable keeps the
    // name untouched
    let id = desktop_name.replace([' ', '-'], "_");

    let mut component = Element::new("component");
    component.set_attr("type", "desktop");
    component.push_element(Element::with_text("id", &id));
    component.push_element(Element::with_text("pkgname", rpm.name()));
    component.push_element(Element::with_text(
        "source_pkgname",
        &rpm.source_package_name(),
    ));
    let mut launchable = Element::new("launchable");
    launchable.set_attr("type", "desktop-id");
    launchable.push_text(&format!("{desktop_name}.desktop"));
    component.push_element(launchable);
    let mut description = Element::new("description");
    description.push_element(Element::with_text("p", rpm.description()));
    component.push_element(description);

    let df = DesktopFile::parse(content);
    if let Some(name) = df.value("Name") {
        component.push_element(Element::with_text("name", name));
    }
    if let Some(generic) = df.value("GenericName") {
        component.push_element(Element::with_text("summary", generic));
    }
    if let Some(icon_name) = df.value("Icon") {
        let mut stock = Element::new("icon");
        stock.set_attr("type", "stock");
        stock.push_text(icon_name);
        component.push_element(stock);
        if collect_icons {
            for element in cached_icons(rpm, icon_files, icon_name, icons)? {
                component.push_element(element);
            }
        }
    }
    if let Some(value) = df.value("Categories") {
        component.push_element(categories_element(value));
    }
    Ok(component)
}

fn categories_element(value: &str) -> Element {
    let mut categories = Element::new("categories");
    for category in value.split(';').filter(|c| !c.is_empty()) {
        categories.push_element(Element::with_text("category", category));
    }
    categories
}

/// Locate packaged icons named `icon_name`, extract their payloads into
/// `icons` and return the `<icon type="cached">` elements to publish.
/// PNGs at 64x64/128x128 are preferred; scalable SVGs are the fallback
/// the spec allows.
fn cached_icons(
    rpm: &Rpm,
    icon_files: &[String],
    icon_name: &str,
    icons: &mut BTreeMap<String, Vec<u8>>,
) -> Result<Vec<Element>, MdError> {
    let png_64 = format!("/64x64/apps/{icon_name}.png");
    let png_128 = format!("/128x128/apps/{icon_name}.png");
    let mut relevant: Vec<String> = icon_files
        .iter()
        .filter(|p| {
            p.starts_with(ICONS_DIR) && (p.ends_with(&png_64) || p.ends_with(&png_128))
        })
        .cloned()
        .collect();
    if relevant.is_empty() {
        let svg = format!("/scalable/apps/{icon_name}.svg");
        let svgz = format!("/scalable/apps/{icon_name}.svgz");
        relevant = icon_files
            .iter()
            .filter(|p| p.starts_with(ICONS_DIR) && (p.ends_with(&svg) || p.ends_with(&svgz)))
            .cloned()
            .collect();
    }
    if relevant.is_empty() {
        return Ok(Vec::new());
    }
    relevant.sort();

    let payloads = rpm.extract_files(&relevant)?;
    let mut elements = Vec::new();
    for path in &relevant {
        let Some(data) = payloads.get(path) else {
            continue;
        };
        let parts: Vec<&str> = path.split('/').collect();
        if parts.len() < 3 {
            continue;
        }
        // .../<theme>/<size>/apps/<name>.<ext>
        let size = parts[parts.len() - 3];
        let ext = path.rsplit('.').next().unwrap_or("png");
        let key = format!("{size}/{icon_name}.{ext}");
        icons.insert(key.clone(), data.clone());

        let mut icon = Element::new("icon");
        icon.set_attr("type", "cached");
        if size == "scalable" {
            icon.set_attr("width", "64");
            icon.set_attr("height", "64");
        } else {
            let pixels = size.split('x').next().unwrap_or("64");
            icon.set_attr("width", pixels);
            icon.set_attr("height", pixels);
        }
        icon.push_text(&key);
        elements.push(icon);
    }
    Ok(elements)
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
