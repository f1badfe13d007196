//! The Python program run inside candidate interpreters. It is passed
//! inline via `-c` so nothing touches the filesystem, uses only the
//! standard library, and prints exactly one JSON document on stdout.

pub const PROBE_SCRIPT: &str = r#"
import json
import os
import platform
import struct
import sys
import sysconfig


def absolute(value):
    return None if value is None else os.path.abspath(value)


prefix = absolute(getattr(sys, "prefix", None))
base_prefix = absolute(getattr(sys, "base_prefix", None))
real_prefix = absolute(getattr(sys, "real_prefix", None))
executable = absolute(sys.executable)

system_executable = executable
if real_prefix is not None or (base_prefix is not None and base_prefix != prefix):
    system_executable = None
    # old-style virtualenvs (real_prefix) carry no base-executable hint
    if real_prefix is None:
        base_exe = getattr(sys, "_base_executable", None)
        if base_exe is not None and base_exe != sys.executable:
            if os.path.exists(base_exe):
                system_executable = absolute(base_exe)
            elif os.name == "posix" and sys.version_info[:2] >= (3, 11):
                folder = os.path.dirname(base_exe)
                major, minor = sys.version_info[0], sys.version_info[1]
                names = ["python%d" % major, "python%d.%d" % (major, minor)]
                if platform.python_implementation() == "PyPy":
                    names += [
                        "pypy",
                        "pypy3",
                        "pypy%d" % major,
                        "pypy%d.%d" % (major, minor),
                    ]
                for name in names:
                    candidate = os.path.join(folder, name)
                    if os.path.exists(candidate):
                        system_executable = absolute(candidate)
                        break

plat = sysconfig.get_platform()
if plat == "win32":
    machine = "x86"
else:
    machine = plat.rsplit("-", 1)[-1]
    if machine == "universal2":
        machine = platform.machine().lower()

paths = {}
for name in sysconfig.get_path_names():
    try:
        paths[name] = sysconfig.get_path(name)
    except KeyError:
        pass

document = {
    "implementation": platform.python_implementation(),
    "version_info": {
        "major": sys.version_info[0],
        "minor": sys.version_info[1],
        "micro": sys.version_info[2],
        "releaselevel": sys.version_info[3],
        "serial": sys.version_info[4],
    },
    "architecture": 32 if struct.calcsize("P") == 4 else 64,
    "platform": sys.platform,
    "machine": machine,
    "free_threaded": sysconfig.get_config_var("Py_GIL_DISABLED") == 1,
    "executable": executable,
    "system_executable": system_executable,
    "sysconfig_vars": dict(sysconfig.get_config_vars()),
    "sysconfig_paths": paths,
}
sys.stdout.write(json.dumps(document, default=str) + "\n")
"#;
