//! Per-package `<package>` element builders.
//!
//! Shared by the full regenerate, the incremental update and the
//! per-file sharding so all three emit identical fragments.

use crate::errors::MdError;
use crate::rpm::{DepType, Dependency, FileInfo, Rpm};
use crate::xml::Element;

/// The `<package type="rpm">` entry of primary.xml.
pub(crate) fn primary_package(rpm: &Rpm, href: &str) -> Result<Element, MdError> {
    let mut package = Element::new("package");
    package.set_attr("type", "rpm");
    package.push_element(Element::with_text("name", rpm.name()));
    package.push_element(Element::with_text("arch", rpm.arch()));
    package.push_element(version_element(rpm));

    let mut checksum = Element::new("checksum");
    checksum.set_attr("type", "sha256");
    checksum.set_attr("pkgid", "YES");
    checksum.push_text(rpm.sha256()?);
    package.push_element(checksum);

    package.push_element(Element::with_text("summary", rpm.summary()));
    package.push_element(Element::with_text("description", rpm.description()));
    package.push_element(Element::with_text("packager", rpm.packager()));
    package.push_element(Element::with_text("url", rpm.url()));

    let mut time = Element::new("time");
    time.set_attr("file", rpm.file_mtime().to_string());
    time.set_attr("build", rpm.build_time().to_string());
    package.push_element(time);

    let mut size = Element::new("size");
    size.set_attr("package", rpm.file_size().to_string());
    size.set_attr("installed", rpm.installed_size().to_string());
    size.set_attr("archive", rpm.archive_size().to_string());
    package.push_element(size);

    let mut location = Element::new("location");
    location.set_attr("href", href);
    package.push_element(location);

    let mut format = Element::new("format");
    format.push_element(Element::with_text("rpm:license", rpm.license()));
    format.push_element(Element::with_text("rpm:vendor", rpm.vendor()));
    format.push_element(Element::with_text("rpm:group", rpm.group()));
    format.push_element(Element::with_text("rpm:buildhost", rpm.build_host()));
    format.push_element(Element::with_text("rpm:sourcerpm", rpm.source_rpm()));

    let mut header_range = Element::new("rpm:header-range");
    header_range.set_attr("start", rpm.headers_start().to_string());
    header_range.set_attr("end", rpm.headers_end().to_string());
    format.push_element(header_range);

    for dep_type in DepType::ALL {
        let deps = rpm.dependencies(dep_type);
        if deps.is_empty() {
            continue;
        }
        let mut section = Element::new(format!("rpm:{}", dep_type.xml_tag()));
        for dep in &deps {
            section.push_element(dependency_entry(dep));
        }
        format.push_element(section);
    }

    for file in rpm.file_list(true) {
        format.push_element(file_element(&file));
    }
    package.push_element(format);
    Ok(package)
}

/// The `<package>` entry of filelists.xml (full file list).
pub(crate) fn filelists_package(rpm: &Rpm) -> Result<Element, MdError> {
    let mut package = package_shell(rpm)?;
    for file in rpm.file_list(false) {
        package.push_element(file_element(&file));
    }
    Ok(package)
}

/// The `<package>` entry of other.xml.
pub(crate) fn other_package(rpm: &Rpm) -> Result<Element, MdError> {
    package_shell(rpm)
}

fn package_shell(rpm: &Rpm) -> Result<Element, MdError> {
    let mut package = Element::new("package");
    package.set_attr("pkgid", rpm.sha256()?);
    package.set_attr("name", rpm.name());
    package.set_attr("arch", rpm.arch());
    package.push_element(version_element(rpm));
    Ok(package)
}

fn version_element(rpm: &Rpm) -> Element {
    let mut version = Element::new("version");
    version.set_attr("epoch", rpm.epoch().to_string());
    version.set_attr("ver", rpm.version());
    version.set_attr("rel", rpm.release());
    version
}

fn dependency_entry(dep: &Dependency) -> Element {
    let mut entry = Element::new("rpm:entry");
    entry.set_attr("name", &dep.name);
    if let Some(flags) = dep.flags_attr() {
        entry.set_attr("flags", flags);
    }
    if !dep.version.is_empty() {
        let (epoch, ver, rel) = dep.evr();
        if let Some(epoch) = epoch {
            entry.set_attr("epoch", epoch);
        }
        entry.set_attr("ver", ver);
        if let Some(rel) = rel {
            entry.set_attr("rel", rel);
        }
    }
    entry
}

fn file_element(file: &FileInfo) -> Element {
    let mut element = Element::new("file");
    if file.is_ghost() {
        element.set_attr("type", "ghost");
    } else if file.is_dir() {
        element.set_attr("type", "dir");
    }
    element.push_text(&file.path);
    element
}
